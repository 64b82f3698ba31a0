//! Medical reports and their attachments.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{require_admin, BloodBank};
use crate::error::{Error, Result};
use crate::model::{Attachment, MedicalReport, NewReport, Role, User};
use crate::validation::{validate_blood_pressure, validate_file_name};

/// Write `content` to a temporary file in `dir` and rename it over `path`,
/// so readers never see a partial file.
fn store_atomically(dir: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let tmp = dir.join(format!(".upload-{}", Uuid::new_v4().simple()));
    let written = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn validate_vitals(report: &NewReport) -> Result<()> {
    if let Some(hb) = report.hemoglobin_g_dl {
        if !hb.is_finite() || hb <= 0.0 || hb > 25.0 {
            return Err(Error::validation(format!(
                "haemoglobin {hb} g/dL is out of range"
            )));
        }
    }
    if let Some(bp) = &report.blood_pressure {
        validate_blood_pressure(bp)?;
    }
    if let Some(pulse) = report.pulse_bpm {
        if !(20..=250).contains(&pulse) {
            return Err(Error::validation(format!("pulse {pulse} bpm is out of range")));
        }
    }
    if let Some(temp) = report.temperature_c {
        if !temp.is_finite() || !(30.0..=45.0).contains(&temp) {
            return Err(Error::validation(format!(
                "temperature {temp} °C is out of range"
            )));
        }
    }
    Ok(())
}

impl BloodBank {
    /// Validate and store a report. Runs inside the caller's transaction.
    pub(crate) fn insert_report_in_tx(&self, report: &NewReport, now: DateTime<Utc>) -> Result<i64> {
        validate_vitals(report)?;
        self.get_donor(report.donor_id)?;
        if let Some(appointment_id) = report.appointment_id {
            let appointment = self.get_appointment(appointment_id)?;
            if appointment.donor_id != report.donor_id {
                return Err(Error::validation(format!(
                    "appointment {appointment_id} belongs to another donor"
                )));
            }
        }
        self.storage.insert_report(report, now)
    }

    /// Record a medical report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] unless `admin` is an admin and
    /// [`Error::Validation`] for implausible vitals.
    pub fn add_report(
        &self,
        admin: &User,
        report: &NewReport,
        now: DateTime<Utc>,
    ) -> Result<MedicalReport> {
        require_admin(admin)?;
        let id = self.insert_report_in_tx(report, now)?;
        info!(report_id = id, donor_id = report.donor_id, "Recorded medical report");
        self.load_report(id)
    }

    fn load_report(&self, id: i64) -> Result<MedicalReport> {
        self.storage
            .get_report(id)?
            .ok_or_else(|| Error::not_found("report", id))
    }

    /// Whether `viewer` may see reports of `donor_id`.
    fn can_see_reports(&self, viewer: &User, donor_id: i64) -> Result<bool> {
        Ok(match viewer.role {
            Role::Admin => true,
            Role::Donor => self
                .storage
                .get_donor_by_user(viewer.id)?
                .is_some_and(|d| d.id == donor_id),
            Role::Hospital => false,
        })
    }

    /// Get a report: admins any, donors their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist or is not visible.
    pub fn get_report(&self, viewer: &User, id: i64) -> Result<MedicalReport> {
        let report = self.load_report(id)?;
        if !self.can_see_reports(viewer, report.donor_id)? {
            return Err(Error::not_found("report", id));
        }
        Ok(report)
    }

    /// All reports for a donor, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the donor does not exist or is not
    /// visible to `viewer`.
    pub fn reports_for_donor(&self, viewer: &User, donor_id: i64) -> Result<Vec<MedicalReport>> {
        self.get_donor(donor_id)?;
        if !self.can_see_reports(viewer, donor_id)? {
            return Err(Error::not_found("donor", donor_id));
        }
        self.storage.reports_for_donor(donor_id)
    }

    fn attachment_path(&self, checksum: &str) -> PathBuf {
        self.config.reports_dir().join(checksum)
    }

    /// Attach a document to a report, replacing any previous one.
    ///
    /// Content is stored once per BLAKE3 digest under `reports_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty or oversized file or an
    /// extension outside the allow-list, and [`Error::DirectoryCreate`] if
    /// the attachment directory cannot be created.
    pub fn attach_file(
        &self,
        viewer: &User,
        report_id: i64,
        file_name: &str,
        content: &[u8],
    ) -> Result<MedicalReport> {
        self.get_report(viewer, report_id)?;

        let extension = validate_file_name(file_name)?;
        let allowed = &self.config.reports.allowed_extensions;
        if !allowed.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
            return Err(Error::validation(format!(
                "'.{extension}' files are not accepted (allowed: {})",
                allowed.join(", ")
            )));
        }
        if content.is_empty() {
            return Err(Error::validation("attachment is empty"));
        }
        let max = self.config.reports.max_attachment_bytes;
        if content.len() > max {
            return Err(Error::validation(format!(
                "attachment is {} bytes, the limit is {max}",
                content.len()
            )));
        }

        let checksum = Attachment::compute_checksum(content);
        let dir = self.config.reports_dir();
        fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
        let path = self.attachment_path(&checksum);
        let intact = fs::read(&path)
            .is_ok_and(|stored| Attachment::compute_checksum(&stored) == checksum);
        if intact {
            debug!(%checksum, "Attachment content already stored");
        } else {
            if path.exists() {
                warn!(%checksum, "Replacing damaged attachment content");
            }
            store_atomically(&dir, &path, content)?;
        }

        let attachment = Attachment {
            file_name: file_name.to_string(),
            content_type: Attachment::content_type_for(&extension).to_string(),
            size_bytes: content.len() as u64,
            checksum,
        };
        self.storage.set_report_attachment(report_id, &attachment)?;
        info!(report_id, size = attachment.size_bytes, "Attached file to report");
        self.load_report(report_id)
    }

    /// Read back a report's attachment, checking its digest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the report has no attachment and
    /// [`Error::Internal`] if the stored content no longer matches its digest.
    pub fn attachment_bytes(&self, viewer: &User, report_id: i64) -> Result<(Attachment, Vec<u8>)> {
        let attachment = self
            .get_report(viewer, report_id)?
            .attachment
            .ok_or_else(|| Error::not_found("attachment for report", report_id))?;
        let content = fs::read(self.attachment_path(&attachment.checksum))?;
        if Attachment::compute_checksum(&content) != attachment.checksum {
            warn!(report_id, checksum = %attachment.checksum, "Attachment content corrupted");
            return Err(Error::internal(format!(
                "attachment of report {report_id} does not match its checksum"
            )));
        }
        Ok((attachment, content))
    }
}
