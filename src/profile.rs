//! Student profile loading and prompt rendering.
//!
//! Profiles live as one JSON file per student in the configured profile
//! directory. Loading never fails hard: a missing or malformed file becomes
//! [`ProfileRecord::Invalid`], which renders as a fixed "no data" line so the
//! advisor can still answer and the tutor is unaffected.

use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use crate::models::StudentProfile;

/// Rendered in place of a profile that could not be loaded.
pub const NO_PROFILE_TEXT: &str = "No profile data available.";

/// GPA below this value puts a student in the warning state.
pub const GPA_WARNING_THRESHOLD: f64 = 2.5;

const PROFILE_EXTENSION: &str = "json";

/// Where a profile is read from.
#[derive(Debug, Clone, Copy)]
pub enum ProfileSource<'a> {
    Path(&'a Path),
    Upload { name: &'a str, bytes: &'a [u8] },
}

/// Outcome of [`load`]: a parsed profile or the reason it could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileRecord {
    Loaded(StudentProfile),
    Invalid { reason: String },
}

/// Academic status indicator derived from the numeric GPA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandingStatus {
    Warning,
    Good,
    /// No GPA on record (or the profile failed to load).
    Unknown,
}

impl StandingStatus {
    pub fn from_gpa(gpa: Option<f64>) -> Self {
        match gpa {
            Some(g) if g.is_finite() && g < GPA_WARNING_THRESHOLD => StandingStatus::Warning,
            Some(g) if g.is_finite() => StandingStatus::Good,
            _ => StandingStatus::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StandingStatus::Warning => "warning",
            StandingStatus::Good => "good",
            StandingStatus::Unknown => "unknown",
        }
    }
}

impl ProfileRecord {
    pub fn profile(&self) -> Option<&StudentProfile> {
        match self {
            ProfileRecord::Loaded(p) => Some(p),
            ProfileRecord::Invalid { .. } => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ProfileRecord::Loaded(_))
    }

    pub fn standing_status(&self) -> StandingStatus {
        StandingStatus::from_gpa(self.profile().and_then(|p| p.gpa))
    }

    /// The student's name, or `fallback` (usually the file name) when unknown.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.profile()
            .and_then(|p| p.name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(fallback)
    }

    /// Academic standing text with the `"Unknown"` placeholder.
    pub fn standing_text(&self) -> &str {
        self.profile()
            .and_then(|p| p.academic_standing.as_deref())
            .unwrap_or("Unknown")
    }
}

/// Read and parse a profile. Never returns an error; see [`ProfileRecord::Invalid`].
pub fn load(source: ProfileSource<'_>) -> ProfileRecord {
    let (label, bytes) = match source {
        ProfileSource::Path(path) => match std::fs::read(path) {
            Ok(bytes) => (path.display().to_string(), bytes),
            Err(e) => {
                return ProfileRecord::Invalid {
                    reason: format!("cannot read {}: {}", path.display(), e),
                }
            }
        },
        ProfileSource::Upload { name, bytes } => (name.to_string(), bytes.to_vec()),
    };

    match serde_json::from_slice::<StudentProfile>(&bytes) {
        Ok(profile) => ProfileRecord::Loaded(profile),
        Err(e) => {
            tracing::warn!(source = %label, error = %e, "profile is not valid JSON");
            ProfileRecord::Invalid {
                reason: format!("{} is not a valid profile: {}", label, e),
            }
        }
    }
}

/// Render a profile as the text block injected into the advisor prompt.
///
/// Field order is fixed. Missing values become `"N/A"`, `"Unknown"` or
/// `"Undeclared"`; an invalid record renders exactly [`NO_PROFILE_TEXT`].
pub fn format_for_prompt(record: &ProfileRecord) -> String {
    let profile = match record {
        ProfileRecord::Loaded(p) => p,
        ProfileRecord::Invalid { .. } => return NO_PROFILE_TEXT.to_string(),
    };

    let mut text = String::new();
    let _ = writeln!(text, "Student Name: {}", or(&profile.name, "Unknown"));
    let _ = writeln!(text, "Major: {}", or(&profile.major, "Undeclared"));
    let _ = writeln!(text, "Year: {}", or(&profile.year, "N/A"));
    let _ = writeln!(
        text,
        "GPA: {} ({})",
        format_gpa(profile.gpa),
        or(&profile.academic_standing, "Unknown")
    );
    text.push_str("Current Courses:\n");
    for (code, course) in &profile.courses {
        let _ = writeln!(
            text,
            "- {} ({}): Grade {}, Attendance {}",
            code,
            or(&course.name, "N/A"),
            or(&course.grade, "N/A"),
            or(&course.attendance, "N/A")
        );
    }
    text
}

fn or<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    value.as_deref().unwrap_or(placeholder)
}

/// `3` renders as `3.0`, `1.75` stays `1.75`, missing is `N/A`.
pub fn format_gpa(gpa: Option<f64>) -> String {
    match gpa {
        Some(g) if g.fract() == 0.0 => format!("{:.1}", g),
        Some(g) => g.to_string(),
        None => "N/A".to_string(),
    }
}

/// List profile files (by file name) in `dir`, sorted. Absent directory → empty list.
pub fn list_available(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let path = e.path();
            let is_profile = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(PROFILE_EXTENSION))
                .unwrap_or(false);
            if is_profile {
                e.file_name().to_str().map(|s| s.to_string())
            } else {
                None
            }
        })
        .collect();
    names.sort();
    names
}

/// A profile directory that resolves identifiers returned by [`list_available`].
#[derive(Debug, Clone)]
pub struct ProfileDirectory {
    root: PathBuf,
}

impl ProfileDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list(&self) -> Vec<String> {
        list_available(&self.root)
    }

    /// Resolve `id` (a file name, with or without `.json`) inside the directory.
    ///
    /// Identifiers containing path separators or `..` are rejected.
    pub fn resolve(&self, id: &str) -> Option<PathBuf> {
        let candidate = Path::new(id);
        let mut components = candidate.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return None,
        }
        let mut file = PathBuf::from(id);
        if file.extension().is_none() {
            file.set_extension(PROFILE_EXTENSION);
        }
        Some(self.root.join(file))
    }

    /// Load a profile by identifier; unknown identifiers become an invalid record.
    pub fn load(&self, id: &str) -> ProfileRecord {
        match self.resolve(id) {
            Some(path) => load(ProfileSource::Path(&path)),
            None => ProfileRecord::Invalid {
                reason: format!("invalid profile identifier: {}", id),
            },
        }
    }
}
