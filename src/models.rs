use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the exchange a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Lost,
    Found,
}

impl ReportKind {
    /// The kind a candidate must have to be scored against this one.
    pub fn opposite(&self) -> ReportKind {
        match self {
            ReportKind::Lost => ReportKind::Found,
            ReportKind::Found => ReportKind::Lost,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Lost => "lost",
            ReportKind::Found => "found",
        }
    }

    pub fn parse(s: &str) -> Option<ReportKind> {
        match s {
            "lost" => Some(ReportKind::Lost),
            "found" => Some(ReportKind::Found),
            _ => None,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report lifecycle. `Delivered` is only ever reached through the lifecycle
/// manager's synchronized transition, never by a generic status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processing,
    Matched,
    Contacted,
    Delivered,
    Closed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Matched => "matched",
            ReportStatus::Contacted => "contacted",
            ReportStatus::Delivered => "delivered",
            ReportStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<ReportStatus> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "processing" => Some(ReportStatus::Processing),
            "matched" => Some(ReportStatus::Matched),
            "contacted" => Some(ReportStatus::Contacted),
            "delivered" => Some(ReportStatus::Delivered),
            "closed" => Some(ReportStatus::Closed),
            _ => None,
        }
    }

    /// Whether the report is still eligible for matching.
    pub fn is_open(&self) -> bool {
        !matches!(self, ReportStatus::Delivered | ReportStatus::Closed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Match lifecycle. `Confirmed` and `Rejected` are terminal: routine
/// recomputation may only overwrite `Pending` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<MatchStatus> {
        match s {
            "pending" => Some(MatchStatus::Pending),
            "confirmed" => Some(MatchStatus::Confirmed),
            "rejected" => Some(MatchStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Confirmed | MatchStatus::Rejected)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One photo attached to a report, with whatever enrichment has arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportImage {
    pub image_url: String,

    /// AI-generated caption; feeds the text signal, not the visual one.
    pub ai_description: Option<String>,

    /// 64-bit average hash, present once enrichment has run.
    pub fingerprint: Option<u64>,

    /// 24 normalized RGB-bin values, present once enrichment has run.
    pub histogram: Option<Vec<f32>>,
}

/// A lost-or-found record, as consumed by the scorer. CRUD on these lives
/// outside this service; we read them and flip their status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    /// Short human-readable number for support conversations.
    pub short_id: i64,
    pub user_id: String,
    pub kind: ReportKind,
    pub title: String,
    pub description: String,
    pub category: String,
    pub color: Option<String>,
    pub distinguishing_marks: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// ISO date the loss/find occurred.
    pub occurred_on: String,
    pub status: ReportStatus,
    pub images: Vec<ReportImage>,
}

/// A scored lost/found pairing. At most one row exists per
/// (lost_report_id, found_report_id); recomputation upserts, never duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub lost_report_id: String,
    pub found_report_id: String,
    pub image_score: f64,
    pub text_score: f64,
    pub location_score: f64,
    pub time_score: f64,
    pub final_score: f64,
    pub category_match: bool,
    pub status: MatchStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_opposite_roundtrips() {
        assert_eq!(ReportKind::Lost.opposite(), ReportKind::Found);
        assert_eq!(ReportKind::Found.opposite().opposite(), ReportKind::Found);
    }

    #[test]
    fn status_string_codec_roundtrips() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::Processing,
            ReportStatus::Matched,
            ReportStatus::Contacted,
            ReportStatus::Delivered,
            ReportStatus::Closed,
        ] {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReportStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_match_statuses() {
        assert!(!MatchStatus::Pending.is_terminal());
        assert!(MatchStatus::Confirmed.is_terminal());
        assert!(MatchStatus::Rejected.is_terminal());
    }
}
