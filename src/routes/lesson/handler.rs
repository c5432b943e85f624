use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::AppState;
use crate::schedule::{
    SESSIONS_PER_MONTH, is_valid_training_date, monthly_occurrences, pro_rated_price,
    remaining_occurrences, weekday_from_index,
};
use crate::utils::{error_codes, error_to_api_response, success_to_api_response};

use super::model::{QuoteResponse, ScheduleResponse, ValidateDateResponse};

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub weekday: u8,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub weekday: u8,
    pub from: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

/// The billable dates for a weekly lesson slot in one month.
#[axum::debug_handler]
pub async fn monthly_schedule(
    Query(query): Query<ScheduleQuery>,
) -> impl IntoResponse {
    let Some(weekday) = weekday_from_index(query.weekday) else {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "weekday must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ),
        );
    };
    if !(1..=12).contains(&query.month) {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "month must be between 1 and 12".to_string(),
            ),
        );
    }

    let dates = monthly_occurrences(weekday, query.year, query.month);
    (
        StatusCode::OK,
        success_to_api_response(ScheduleResponse {
            weekday: query.weekday,
            year: query.year,
            month: query.month,
            dates,
        }),
    )
}

/// Pro-rated price for joining a weekly lesson slot mid-month.
#[axum::debug_handler]
pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> impl IntoResponse {
    let Some(weekday) = weekday_from_index(query.weekday) else {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "weekday must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ),
        );
    };

    let monthly_price = state.config.lesson_monthly_price;
    let total_sessions = SESSIONS_PER_MONTH as u32;
    let remaining_sessions = remaining_occurrences(weekday, query.from);

    (
        StatusCode::OK,
        success_to_api_response(QuoteResponse {
            remaining_sessions,
            total_sessions,
            monthly_price,
            pro_rated_price: pro_rated_price(monthly_price, total_sessions, remaining_sessions),
        }),
    )
}

/// Whether a calendar date is a billable occurrence of its own weekday.
#[axum::debug_handler]
pub async fn validate_date(Query(query): Query<DateQuery>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(ValidateDateResponse {
            date: query.date,
            valid: is_valid_training_date(query.date),
        }),
    )
}
