use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::CombineError;

const CLIP_TIMESTAMP: &str = "%Y%m%dT%H%M%SZ";

/// A rendered per-bag clip on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRef {
    pub path: PathBuf,
    pub subject: String,
    pub model: String,
    pub vehicle: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ClipRef {
    pub fn new(
        path: impl Into<PathBuf>,
        subject: &str,
        model: &str,
        vehicle: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            subject: normalize_component(subject),
            model: normalize_component(model),
            vehicle: vehicle.map(normalize_component).filter(|v| !v.is_empty()),
            timestamp,
        }
    }

    /// Parses `{subject}_{model}[_{vehicle}]_{%Y%m%dT%H%M%SZ}.mp4`.
    pub fn from_path(path: &Path) -> Result<Self, CombineError> {
        let invalid = || CombineError::ClipName(path.display().to_string());
        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;

        let parts: Vec<&str> = stem.split('_').collect();
        let (subject, model, vehicle, stamp) = match parts.as_slice() {
            [subject, model, stamp] => (*subject, *model, None, *stamp),
            [subject, model, vehicle, stamp] => (*subject, *model, Some(*vehicle), *stamp),
            _ => return Err(invalid()),
        };
        if subject.is_empty() || model.is_empty() {
            return Err(invalid());
        }
        let timestamp = NaiveDateTime::parse_from_str(stamp, CLIP_TIMESTAMP)
            .map_err(|_| invalid())?
            .and_utc();

        Ok(Self {
            path: path.to_path_buf(),
            subject: subject.to_string(),
            model: model.to_string(),
            vehicle: vehicle.map(str::to_string),
            timestamp,
        })
    }
}

/// File name for a per-bag clip, parseable by [`ClipRef::from_path`].
pub fn clip_file_name(
    subject: &str,
    model: &str,
    vehicle: Option<&str>,
    timestamp: DateTime<Utc>,
) -> String {
    let mut parts = vec![normalize_component(subject), normalize_component(model)];
    if let Some(vehicle) = vehicle.map(normalize_component).filter(|v| !v.is_empty()) {
        parts.push(vehicle);
    }
    parts.push(timestamp.format(CLIP_TIMESTAMP).to_string());
    format!("{}.mp4", parts.join("_"))
}

const UNNAMED: &str = "unknown";

/// Makes a name safe as one `_`-separated file name component. Names with no
/// usable character become `unknown`.
pub fn normalize_component(name: &str) -> String {
    let mapped: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let mut out = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let out = out.trim_matches('-');
    if out.is_empty() {
        return UNNAMED.to_string();
    }
    out.to_string()
}

/// Lists `*.mp4` files under `dir` that parse as clips; other files are skipped with a warning.
pub fn scan_clips(dir: &Path) -> Result<Vec<ClipRef>, CombineError> {
    let mut clips = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| CombineError::Io(e.into()))?;
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "mp4") {
            continue;
        }
        match ClipRef::from_path(path) {
            Ok(clip) => clips.push(clip),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(clips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, h, m, 3).unwrap()
    }

    #[test]
    fn file_names_parse_back() {
        let name = clip_file_name("Jane Doe", "fast_model v2", None, at(9, 30));
        assert_eq!(name, "Jane-Doe_fast-model-v2_20240517T093003Z.mp4");

        let clip = ClipRef::from_path(Path::new(&name)).unwrap();
        assert_eq!(clip.subject, "Jane-Doe");
        assert_eq!(clip.model, "fast-model-v2");
        assert_eq!(clip.vehicle, None);
        assert_eq!(clip.timestamp, at(9, 30));
    }

    #[test]
    fn vehicle_is_an_optional_fourth_component() {
        let name = clip_file_name("jane", "m1", Some("car 7"), at(1, 2));
        let clip = ClipRef::from_path(Path::new(&name)).unwrap();
        assert_eq!(clip.vehicle.as_deref(), Some("car-7"));
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["clip.mp4", "a_b_notatime.mp4", "a_b_c_d_e.mp4", "_m_20240517T093003Z.mp4"] {
            assert!(
                matches!(ClipRef::from_path(Path::new(name)), Err(CombineError::ClipName(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn normalization_collapses_separators() {
        assert_eq!(normalize_component("  a__b  c "), "a-b-c");
        assert_eq!(normalize_component("v1.2"), "v1.2");
        assert_eq!(normalize_component("Łódź"), "d");
        assert_eq!(normalize_component("日本"), "unknown");
        assert_eq!(normalize_component("  "), "unknown");
    }

    #[test]
    fn unusable_subjects_still_produce_parseable_names() {
        let name = clip_file_name("日本", "m1", None, at(1, 0));
        assert!(name.starts_with("unknown_m1_"), "{name}");

        let clip = ClipRef::from_path(Path::new(&name)).unwrap();
        assert_eq!(clip.subject, "unknown");
        assert_eq!(clip.model, "m1");
    }

    #[test]
    fn scan_keeps_parseable_mp4_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            clip_file_name("b", "m", None, at(2, 0)),
            clip_file_name("a", "m", None, at(1, 0)),
            "notes.txt".to_string(),
            "random.mp4".to_string(),
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let clips = scan_clips(dir.path()).unwrap();
        let subjects: Vec<&str> = clips.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["a", "b"]);
    }
}
