use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder shown for any absent or empty value.
pub const PLACEHOLDER: &str = "-";

/// Lifecycle phase of a job, owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Progress {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Done,
}

impl Progress {
    pub const ALL: [Progress; 7] = [
        Progress::Created,
        Progress::Starting,
        Progress::Running,
        Progress::Stopping,
        Progress::Stopped,
        Progress::Error,
        Progress::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
            Self::Done => "DONE",
        }
    }
}

/// A single key/value pair as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "ParameterKey", alias = "key")]
    pub key: String,
    #[serde(rename = "ParameterValue", alias = "value", default)]
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// Job as returned by `jobs.get`, before flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJob {
    pub id: String,
    #[serde(default)]
    pub progress: Option<Progress>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Vec<Parameter>>,
}

/// A named field produced by flattening the parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// Immutable point-in-time snapshot of a job.
///
/// Built once per successful fetch. The view holds it behind an `Arc` and
/// replaces it wholesale, so fields from two fetches can never be mixed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub progress: Option<Progress>,
    pub created_at: DateTime<Utc>,
    pub description: String,
    fields: Vec<Field>,
}

impl JobRecord {
    /// Flatten a raw job into a record.
    ///
    /// Empty or missing parameter values become [`PLACEHOLDER`]. A repeated key
    /// keeps its first position and takes the later value.
    pub fn from_raw(raw: RawJob) -> Self {
        let mut fields: Vec<Field> = Vec::new();

        for param in raw.parameters.unwrap_or_default() {
            let value = non_empty(param.value);
            match fields.iter_mut().find(|f| f.name == param.key) {
                Some(existing) => existing.value = value,
                None => fields.push(Field {
                    name: param.key,
                    value,
                }),
            }
        }

        Self {
            id: raw.id,
            progress: raw.progress,
            created_at: raw.created_at,
            description: non_empty(raw.description),
            fields,
        }
    }

    /// Look up a flattened parameter by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Like [`field`](Self::field), but renders a missing key as the placeholder.
    pub fn field_or_placeholder(&self, name: &str) -> &str {
        self.field(name).unwrap_or(PLACEHOLDER)
    }

    /// Flattened parameters in backend order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

fn non_empty(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => PLACEHOLDER.to_string(),
    }
}
