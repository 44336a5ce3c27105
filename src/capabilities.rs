use serde::Serialize;

use crate::{AppError, AppResult};

/// Optional features compiled into this build.
///
/// Computed once at startup and handed to the operations that depend on an
/// optional library, so they fail with `CAPABILITY/MISSING` instead of probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub excel: bool,
    pub pdf: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            excel: cfg!(feature = "excel"),
            pdf: cfg!(feature = "pdf"),
        }
    }

    pub fn none() -> Self {
        Self {
            excel: false,
            pdf: false,
        }
    }

    pub fn require_excel(&self) -> AppResult<()> {
        if self.excel {
            Ok(())
        } else {
            Err(AppError::capability_missing("excel"))
        }
    }

    pub fn require_pdf(&self) -> AppResult<()> {
        if self.pdf {
            Ok(())
        } else {
            Err(AppError::capability_missing("pdf"))
        }
    }

    /// Notes for capabilities that are switched off, logged once at startup.
    pub fn disabled_notes(&self) -> Vec<&'static str> {
        let mut notes = Vec::new();
        if !self.excel {
            notes.push("Excel import/export disabled (build with --features excel)");
        }
        if !self.pdf {
            notes.push("PDF documents disabled (build with --features pdf)");
        }
        notes
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_rejects_everything() {
        let caps = Capabilities::none();
        assert_eq!(
            caps.require_excel().unwrap_err().code(),
            AppError::CAPABILITY_MISSING
        );
        assert_eq!(
            caps.require_pdf().unwrap_err().code(),
            AppError::CAPABILITY_MISSING
        );
        assert_eq!(caps.disabled_notes().len(), 2);
    }

    #[test]
    fn detect_matches_features() {
        let caps = Capabilities::detect();
        assert_eq!(caps.excel, cfg!(feature = "excel"));
        assert_eq!(caps.pdf, cfg!(feature = "pdf"));
        assert_eq!(caps.require_pdf().is_ok(), cfg!(feature = "pdf"));
    }
}
