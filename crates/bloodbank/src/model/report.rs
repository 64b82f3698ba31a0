//! Medical reports recorded for donors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Name the file was uploaded under.
    pub file_name: String,
    /// MIME type derived from the extension.
    pub content_type: String,
    /// File size.
    pub size_bytes: u64,
    /// BLAKE3 hex digest of the content; also the stored file name.
    pub checksum: String,
}

impl Attachment {
    /// Compute the BLAKE3 digest of `content`.
    #[must_use]
    pub fn compute_checksum(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    /// MIME type for a lowercase file extension.
    #[must_use]
    pub fn content_type_for(extension: &str) -> &'static str {
        match extension {
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    }
}

/// Screening and post-donation findings for a donor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalReport {
    /// Row id.
    pub id: i64,
    /// Donor examined.
    pub donor_id: i64,
    /// Appointment the report was taken at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<i64>,
    /// Haemoglobin in g/dL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hemoglobin_g_dl: Option<f64>,
    /// Blood pressure, e.g. `120/80`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    /// Pulse in beats per minute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse_bpm: Option<u32>,
    /// Body temperature in °C.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    /// Free-form findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Uploaded document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// When the report was recorded.
    pub created_at: DateTime<Utc>,
}

/// Input for recording a report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReport {
    /// Donor examined; filled in by the service when attached to an appointment.
    #[serde(default)]
    pub donor_id: i64,
    /// Appointment the report was taken at.
    #[serde(default)]
    pub appointment_id: Option<i64>,
    /// Haemoglobin in g/dL.
    #[serde(default)]
    pub hemoglobin_g_dl: Option<f64>,
    /// Blood pressure, e.g. `120/80`.
    #[serde(default)]
    pub blood_pressure: Option<String>,
    /// Pulse in beats per minute.
    #[serde(default)]
    pub pulse_bpm: Option<u32>,
    /// Body temperature in °C.
    #[serde(default)]
    pub temperature_c: Option<f64>,
    /// Free-form findings.
    #[serde(default)]
    pub notes: Option<String>,
}
