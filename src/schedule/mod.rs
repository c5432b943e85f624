use chrono::{Datelike, Days, NaiveDate, Weekday};

/// A recurring lesson is billed as four sessions per month regardless of how
/// many times its weekday actually occurs. Months with a 5th occurrence get
/// no 5th session: that date is excluded from scheduling and billing alike.
pub const SESSIONS_PER_MONTH: usize = 4;

/// Maps the stored lesson weekday (0 = Sunday .. 6 = Saturday) to chrono.
/// Returns `None` for anything above 6.
pub fn weekday_from_index(idx: u8) -> Option<Weekday> {
    match idx {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Inverse of [`weekday_from_index`].
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// All dates of `month` (1-12) in `year` falling on `weekday`, ascending,
/// truncated to the first [`SESSIONS_PER_MONTH`]. An invalid month yields an
/// empty list.
pub fn monthly_occurrences(weekday: Weekday, year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first_of_month) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    // Walk forward to the first matching weekday, then step a week at a
    // time. Checked adds: near the top of chrono's year range the next step
    // can leave the representable calendar.
    let offset = (7 + weekday.num_days_from_monday() - first_of_month.weekday().num_days_from_monday()) % 7;
    let mut occurrences = Vec::with_capacity(SESSIONS_PER_MONTH);
    let Some(mut date) = first_of_month.checked_add_days(Days::new(offset as u64)) else {
        return occurrences;
    };
    while date.month() == month && occurrences.len() < SESSIONS_PER_MONTH {
        occurrences.push(date);
        match date.checked_add_days(Days::new(7)) {
            Some(next) => date = next,
            None => break,
        }
    }
    occurrences
}

/// How many billable sessions remain in `from`'s month, counting occurrences
/// of `weekday` on or after `from` itself. Returns 0 once `from` has passed
/// the last billable occurrence, including any excluded 5th one.
pub fn remaining_occurrences(weekday: Weekday, from: NaiveDate) -> u32 {
    monthly_occurrences(weekday, from.year(), from.month())
        .into_iter()
        .filter(|occurrence| *occurrence >= from)
        .count() as u32
}

/// Whether `date` is one of the first four occurrences of its own weekday in
/// its own month. This predicate is the single authority for the
/// four-session billing policy; callers validating a scheduled lesson date
/// must go through it rather than re-deriving the rule.
pub fn is_valid_training_date(date: NaiveDate) -> bool {
    monthly_occurrences(date.weekday(), date.year(), date.month()).contains(&date)
}

/// Price for a partial month: `monthly_price / total_sessions *
/// remaining_sessions`, rounded half away from zero. Returns 0 when no
/// sessions remain.
///
/// `total_sessions` must be greater than 0; passing 0 panics.
pub fn pro_rated_price(monthly_price: u32, total_sessions: u32, remaining_sessions: u32) -> u32 {
    debug_assert!(total_sessions > 0, "total_sessions must be positive");
    let monthly_price = monthly_price as u64;
    let total = total_sessions as u64;
    let remaining = remaining_sessions as u64;
    // Half-up rounding in integer arithmetic: 37.5 rounds to 38.
    ((monthly_price * remaining * 2 + total) / (total * 2)) as u32
}
