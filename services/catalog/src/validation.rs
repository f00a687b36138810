//! Declarative request validation.
//!
//! A schema is a flat list of [`FieldRule`]s. [`validate`] walks every rule
//! and collects all violations so a client sees every problem in one round
//! trip. [`ValidJson`] runs a schema as an axum extractor before the body is
//! deserialized into its typed form.

use crate::error::ApiError;
use crate::models::{MediaPatch, NewMedia, NewReview, ReviewPatch};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Ratings a review may carry
pub const ALLOWED_RATINGS: [f64; 11] = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0];

/// What a field must look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// A string that is not empty after trimming
    NonEmptyString,
    /// An absolute http(s) URL
    Url,
    /// A number (or numeric string) from [`ALLOWED_RATINGS`]
    Rating,
}

/// A single field rule
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub kind: RuleKind,
    pub required: bool,
    pub message: &'static str,
}

impl FieldRule {
    const fn required(field: &'static str, kind: RuleKind, message: &'static str) -> Self {
        Self {
            field,
            kind,
            required: true,
            message,
        }
    }

    const fn optional(self) -> Self {
        Self {
            required: false,
            ..self
        }
    }
}

/// A rule violation reported back to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    fn with_value(mut self, value: &Value) -> Self {
        self.value = Some(value.clone());
        self
    }
}

const TITLE: FieldRule = FieldRule::required(
    "Title",
    RuleKind::NonEmptyString,
    "Title is a mandatory field and needs to be a string!",
);
const YEAR: FieldRule = FieldRule::required(
    "Year",
    RuleKind::NonEmptyString,
    "Year is a mandatory field and needs to be a string!",
);
const TYPE: FieldRule = FieldRule::required(
    "Type",
    RuleKind::NonEmptyString,
    "Type is a mandatory field and needs to be a string!",
);
const POSTER: FieldRule = FieldRule::required(
    "Poster",
    RuleKind::Url,
    "Poster is a mandatory field and needs to be a URL!",
);
const COMMENT: FieldRule =
    FieldRule::required("comment", RuleKind::NonEmptyString, "comment must be String");
const RATE: FieldRule = FieldRule::required(
    "rate",
    RuleKind::Rating,
    "Rating must be one of 0, 0.5, 1, ..., 5",
);

pub const MEDIA_CREATE: &[FieldRule] = &[TITLE, YEAR, TYPE, POSTER];
pub const MEDIA_UPDATE: &[FieldRule] = &[
    TITLE.optional(),
    YEAR.optional(),
    TYPE.optional(),
    POSTER.optional(),
];
pub const REVIEW_CREATE: &[FieldRule] = &[COMMENT, RATE];
pub const REVIEW_UPDATE: &[FieldRule] = &[COMMENT.optional(), RATE.optional()];

/// Check `body` against every rule in `schema`
pub fn validate(body: &Value, schema: &[FieldRule]) -> Result<(), Vec<FieldViolation>> {
    let Some(object) = body.as_object() else {
        return Err(vec![FieldViolation::new(
            "body",
            "Request body must be a JSON object",
        )]);
    };

    let violations: Vec<FieldViolation> = schema
        .iter()
        .filter_map(|rule| match object.get(rule.field) {
            None if rule.required => Some(FieldViolation::new(rule.field, rule.message)),
            None => None,
            Some(value) if check(rule.kind, value) => None,
            Some(value) => Some(FieldViolation::new(rule.field, rule.message).with_value(value)),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check(kind: RuleKind, value: &Value) -> bool {
    match kind {
        RuleKind::NonEmptyString => value.as_str().is_some_and(|s| !s.trim().is_empty()),
        RuleKind::Url => value.as_str().is_some_and(is_http_url),
        RuleKind::Rating => parse_rating(value).is_some(),
    }
}

fn is_http_url(raw: &str) -> bool {
    reqwest::Url::parse(raw.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// Read a rating from a number or numeric string, if it is an allowed value
pub fn parse_rating(value: &Value) -> Option<f64> {
    let rating = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    ALLOWED_RATINGS.contains(&rating).then_some(rating)
}

/// Request bodies that carry a validation schema
pub trait Validated: DeserializeOwned {
    const RULES: &'static [FieldRule];
}

impl Validated for NewMedia {
    const RULES: &'static [FieldRule] = MEDIA_CREATE;
}

impl Validated for MediaPatch {
    const RULES: &'static [FieldRule] = MEDIA_UPDATE;
}

impl Validated for NewReview {
    const RULES: &'static [FieldRule] = REVIEW_CREATE;
}

impl Validated for ReviewPatch {
    const RULES: &'static [FieldRule] = REVIEW_UPDATE;
}

/// JSON body extractor that rejects with the full violation list
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: Validated,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

        validate(&body, T::RULES).map_err(ApiError::Validation)?;

        serde_json::from_value(body)
            .map(ValidJson)
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(violations: &[FieldViolation]) -> Vec<&str> {
        violations.iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn test_media_create_accepts_complete_body() {
        let body = json!({
            "Title": "Dune",
            "Year": "2021",
            "Type": "movie",
            "Poster": "http://x/p.jpg"
        });

        assert!(validate(&body, MEDIA_CREATE).is_ok());
    }

    #[test]
    fn test_media_create_reports_every_violation() {
        let body = json!({ "Title": "", "Year": 2021, "Poster": "not a url" });

        let violations = validate(&body, MEDIA_CREATE).unwrap_err();
        assert_eq!(fields(&violations), vec!["Title", "Year", "Type", "Poster"]);
        assert_eq!(violations[1].value, Some(json!(2021)));
        assert_eq!(violations[2].value, None);
    }

    #[test]
    fn test_media_update_allows_partial_body() {
        assert!(validate(&json!({ "Year": "2022" }), MEDIA_UPDATE).is_ok());
        assert!(validate(&json!({}), MEDIA_UPDATE).is_ok());

        let violations = validate(&json!({ "Title": "   " }), MEDIA_UPDATE).unwrap_err();
        assert_eq!(fields(&violations), vec!["Title"]);
    }

    #[test]
    fn test_non_object_body_rejected() {
        let violations = validate(&json!(["Dune"]), MEDIA_UPDATE).unwrap_err();
        assert_eq!(fields(&violations), vec!["body"]);
    }

    #[test]
    fn test_poster_url_shape() {
        assert!(is_http_url("https://cdn.example.com/p.jpg"));
        assert!(!is_http_url("ftp://example.com/p.jpg"));
        assert!(!is_http_url("p.jpg"));
        assert!(!is_http_url(""));
    }

    #[test]
    fn test_rating_accepts_every_half_step() {
        for step in 0..=10 {
            let rating = step as f64 * 0.5;
            let body = json!({ "comment": "ok", "rate": rating });
            assert!(validate(&body, REVIEW_CREATE).is_ok(), "rating {rating}");
        }
    }

    #[test]
    fn test_rating_rejects_off_set_values() {
        for rating in [-0.5, 0.25, 4.75, 5.5, 10.0] {
            let body = json!({ "comment": "ok", "rate": rating });
            let violations = validate(&body, REVIEW_CREATE).unwrap_err();
            assert_eq!(fields(&violations), vec!["rate"], "rating {rating}");
        }
    }

    #[test]
    fn test_rating_numeric_string() {
        assert_eq!(parse_rating(&json!("3.5")), Some(3.5));
        assert_eq!(parse_rating(&json!("five")), None);
        assert_eq!(parse_rating(&json!(null)), None);
        assert_eq!(parse_rating(&json!(true)), None);
    }

    #[test]
    fn test_review_update_optional_fields() {
        assert!(validate(&json!({ "rate": 0 }), REVIEW_UPDATE).is_ok());

        let violations =
            validate(&json!({ "comment": null, "rate": 6 }), REVIEW_UPDATE).unwrap_err();
        assert_eq!(fields(&violations), vec!["comment", "rate"]);
    }
}
