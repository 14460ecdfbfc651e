//! Capture time from camera and app naming conventions.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

/// Parses timestamps embedded in file names
///
/// Recognized forms:
/// - `IMG_20230101_120000.jpg`, `VID_20230101_120000.mp4`,
///   `PXL_20230101_120000123.jpg`, `20230101_120000.jpg`
/// - `2023-01-01 12.00.00.jpg` (desktop photo importers)
/// - `IMG-20230101-WA0001.jpg`, `VID-20230101-WA0001.mp4` (messenger
///   exports, date only, read as midnight)
pub struct FilenameParser {
    compact: Regex,
    dotted: Regex,
    messenger: Regex,
}

impl FilenameParser {
    pub fn new() -> Self {
        Self {
            compact: Regex::new(r"(?:^|\D)(\d{4})(\d{2})(\d{2})[_-](\d{2})(\d{2})(\d{2})")
                .expect("static pattern"),
            dotted: Regex::new(r"(\d{4})-(\d{2})-(\d{2})[ _](\d{2})\.(\d{2})\.(\d{2})")
                .expect("static pattern"),
            messenger: Regex::new(r"(?i)^(?:IMG|VID|AUD|PTT)-(\d{4})(\d{2})(\d{2})-WA\d+")
                .expect("static pattern"),
        }
    }

    /// Timestamp encoded in `file_name`, if any form matches and the
    /// date and time are valid
    pub fn parse(&self, file_name: &str) -> Option<NaiveDateTime> {
        for pattern in [&self.compact, &self.dotted] {
            if let Some(caps) = pattern.captures(file_name) {
                let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
                let date = NaiveDate::from_ymd_opt(field(1)? as i32, field(2)?, field(3)?)?;
                return date.and_hms_opt(field(4)?, field(5)?, field(6)?);
            }
        }

        let caps = self.messenger.captures(file_name)?;
        let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        NaiveDate::from_ymd_opt(field(1)? as i32, field(2)?, field(3)?)?.and_hms_opt(0, 0, 0)
    }
}

impl Default for FilenameParser {
    fn default() -> Self {
        Self::new()
    }
}
