use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub weekday: u8,
    pub year: i32,
    pub month: u32,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub remaining_sessions: u32,
    pub total_sessions: u32,
    pub monthly_price: u32,
    pub pro_rated_price: u32,
}

#[derive(Debug, Serialize)]
pub struct ValidateDateResponse {
    pub date: NaiveDate,
    pub valid: bool,
}
