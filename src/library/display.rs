use std::path::Path;

use crate::config::TrackDisplayField;

/// Tag values read from a local audio file.
#[derive(Debug, Default, Clone)]
pub struct FileTags<'a> {
    pub title: &'a str,
    pub artist: Option<&'a str>,
    pub album: Option<&'a str>,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Compose the title shown in chat for a local file from the configured `fields`.
///
/// Falls back to the raw tag title when no field produced anything.
pub fn title_from_fields(
    path: &Path,
    tags: &FileTags<'_>,
    fields: &[TrackDisplayField],
    sep: &str,
) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for f in fields {
        match f {
            TrackDisplayField::Display => {
                parts.extend(non_blank(tags.artist));
                parts.extend(non_blank(Some(tags.title)));
            }
            TrackDisplayField::Title => parts.extend(non_blank(Some(tags.title))),
            TrackDisplayField::Artist => parts.extend(non_blank(tags.artist)),
            TrackDisplayField::Album => parts.extend(non_blank(tags.album)),
            TrackDisplayField::Filename => {
                parts.extend(non_blank(path.file_stem().and_then(|s| s.to_str())));
            }
            TrackDisplayField::Path => {
                if let Some(p) = path.to_str() {
                    parts.push(p);
                }
            }
        }
    }

    if parts.is_empty() {
        tags.title.to_string()
    } else {
        parts.join(sep)
    }
}
