use chrono::{DateTime, Duration, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Stored media record
///
/// Field names on the wire and on disk follow the catalog's historic JSON
/// documents (`imdbID`, `Title`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Unique media ID
    #[serde(rename = "imdbID")]
    pub id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Type")]
    pub media_type: String,
    /// Poster URL (external or uploaded object)
    #[serde(rename = "Poster")]
    pub poster: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Body of a media create request
#[derive(Debug, Clone, Deserialize)]
pub struct NewMedia {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Type")]
    pub media_type: String,
    #[serde(rename = "Poster")]
    pub poster: String,
}

/// Body of a media update request; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaPatch {
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Year")]
    pub year: Option<String>,
    #[serde(rename = "Type")]
    pub media_type: Option<String>,
    #[serde(rename = "Poster")]
    pub poster: Option<String>,
}

impl Media {
    pub fn new(input: NewMedia) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: input.title.trim().to_string(),
            year: input.year.trim().to_string(),
            media_type: input.media_type.trim().to_string(),
            poster: input.poster.trim().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Shallow merge: overwrite only the fields present in the patch
    pub fn apply(&mut self, patch: MediaPatch) {
        merge_trimmed(&mut self.title, patch.title);
        merge_trimmed(&mut self.year, patch.year);
        merge_trimmed(&mut self.media_type, patch.media_type);
        merge_trimmed(&mut self.poster, patch.poster);
        self.touch();
    }

    pub fn set_poster(&mut self, url: String) {
        self.poster = url;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }
}

/// Stored review record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    /// ID of the media this review belongs to
    #[serde(rename = "elementId")]
    pub media_id: String,
    pub comment: String,
    pub rate: f64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Body of a review create request
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub comment: String,
    #[serde(deserialize_with = "deserialize_rating")]
    pub rate: f64,
}

/// Body of a review update request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPatch {
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_rating")]
    pub rate: Option<f64>,
}

impl Review {
    pub fn new(media_id: &str, input: NewReview) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            media_id: media_id.to_string(),
            comment: input.comment.trim().to_string(),
            rate: input.rate,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: ReviewPatch) {
        merge_trimmed(&mut self.comment, patch.comment);
        if let Some(rate) = patch.rate {
            self.rate = rate;
        }
        self.updated_at = next_timestamp(self.updated_at);
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn merge_trimmed(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value.trim().to_string();
    }
}

/// Current time, bumped past `previous` when the clock has not advanced
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Ratings arrive either as JSON numbers or numeric strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRating {
    Number(f64),
    Text(String),
}

impl RawRating {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            RawRating::Number(n) => Ok(n),
            RawRating::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid rating: {s}"))),
        }
    }
}

fn deserialize_rating<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    RawRating::deserialize(deserializer)?.into_f64()
}

fn deserialize_optional_rating<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawRating>::deserialize(deserializer)?
        .map(RawRating::into_f64)
        .transpose()
}
