//! Query and list commands.

use super::output_error;
use crate::Result;
use crate::config::TagsortConfig;
use crate::services::{QueryAst, TagIndex, TagSort, resolve_image_path};
use std::io::Write;

/// Runs a tag query and prints the count with up to `limit` sample paths.
///
/// The query is parsed before the index is opened, so a malformed query
/// fails without reading anything.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidQuery`] or [`crate::Error::UnknownTags`]
/// for a bad query, or an I/O error if the index cannot be read.
pub fn cmd_query<W: Write>(
    out: &mut W,
    config: &TagsortConfig,
    tags: &str,
    limit: usize,
) -> Result<Vec<String>> {
    let ast = QueryAst::parse(tags)?;
    let index = TagIndex::load(&config.tag_index)?;
    let matches = index.query(tags)?;

    writeln!(out, "Found {} files matching '{ast}'", matches.len()).map_err(output_error)?;
    for file in matches.iter().take(limit) {
        let path = resolve_image_path(config.image_root.as_deref(), file);
        writeln!(out, "  {}", path.display()).map_err(output_error)?;
    }
    if matches.len() > limit {
        writeln!(out, "  ... and {} more", matches.len() - limit).map_err(output_error)?;
    }

    Ok(matches)
}

/// Lists indexed tags with their counts.
///
/// # Errors
///
/// Returns an error if the index cannot be read or output fails.
pub fn cmd_list<W: Write>(
    out: &mut W,
    config: &TagsortConfig,
    sort: TagSort,
    limit: Option<usize>,
) -> Result<()> {
    let index = TagIndex::load(&config.tag_index)?;
    let tags = index.list(sort);

    writeln!(
        out,
        "{} tags across {} files (sorted by {sort})",
        index.tag_count(),
        index.file_count()
    )
    .map_err(output_error)?;
    for (tag, count) in tags.iter().take(limit.unwrap_or(usize::MAX)) {
        writeln!(out, "{count:>8}  {tag}").map_err(output_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::path::Path;

    fn config_with_index(dir: &Path) -> TagsortConfig {
        let index = dir.join("tag_frequency.json");
        std::fs::write(
            &index,
            r#"{"tags": {
                "elf": {"count": 3, "images": ["a.png", "b.png", "c.png"]},
                "armor": {"count": 1, "images": ["b.png"]}
            }}"#,
        )
        .unwrap();
        let mut config = TagsortConfig::default();
        config.tag_index = index;
        config.image_root = Some(dir.join("images"));
        config
    }

    #[test]
    fn test_query_prints_count_and_sample() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_index(dir.path());
        let mut out = Vec::new();

        let matches = cmd_query(&mut out, &config, "elf, !armor", 1).unwrap();

        assert_eq!(matches, vec!["a.png", "c.png"]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Found 2 files matching 'elf,!armor'"));
        assert!(text.contains(&dir.path().join("images").join("a.png").display().to_string()));
        assert!(text.contains("... and 1 more"));
    }

    #[test]
    fn test_empty_query_fails_before_reading_index() {
        let mut config = TagsortConfig::default();
        config.tag_index = "/nonexistent/tag_frequency.json".into();
        let mut out = Vec::new();

        let err = cmd_query(&mut out, &config, " , ", 10).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_tag_suggests() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_index(dir.path());
        let mut out = Vec::new();

        let err = cmd_query(&mut out, &config, "elff", 10).unwrap_err();
        assert!(err.to_string().contains("did you mean: elf"));
    }

    #[test]
    fn test_list_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_index(dir.path());
        let mut out = Vec::new();

        cmd_list(&mut out, &config, TagSort::Name, None).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2 tags across 3 files (sorted by name)");
        assert_eq!(lines[1].trim(), "1  armor");
        assert_eq!(lines[2].trim(), "3  elf");
    }
}
