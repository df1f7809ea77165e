//! Firmware catalogue listing and selection.

use {
    crate::{Cli, CliError, config::Config, serial::map_prompt_error, use_fancy_output},
    anyhow::Result,
    console::style,
    dialoguer::{Select, theme::ColorfulTheme},
    ideaflash::{DEFAULT_CATALOG, DirectorySource, FirmwareEntry, FirmwareSource},
    std::path::Path,
};

/// Source for `dir`, falling back to the built-in catalogue when the
/// directory holds no images so the expected path is still shown.
pub(crate) fn firmware_source(dir: &Path) -> Result<DirectorySource> {
    let source = DirectorySource::new(dir);
    if source
        .list()?
        .is_empty()
    {
        Ok(source.with_catalog(
            DEFAULT_CATALOG
                .iter()
                .copied(),
        ))
    } else {
        Ok(source)
    }
}

/// `firmware` command: list the catalogue.
pub(crate) fn cmd_firmware(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let dir = cli.firmware_dir(config);
    let entries = firmware_source(&dir)?.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries_json(&entries))?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style(format!("Firmware images in {}:", dir.display()))
            .bold()
            .underlined()
    );
    for entry in &entries {
        let size = if entry
            .size
            .is_some()
        {
            style(entry.human_size()).dim()
        } else {
            style(entry.human_size()).red()
        };
        eprintln!(
            "  {} {} ({})",
            style("•").green(),
            style(&entry.id).cyan(),
            size
        );
    }
    Ok(())
}

fn entries_json(entries: &[FirmwareEntry]) -> Vec<serde_json::Value> {
    entries
        .iter()
        .map(|entry| {
            serde_json::json!({
                "id": entry.id,
                "name": entry.name,
                "size": entry.size,
                "available": entry.size.is_some(),
            })
        })
        .collect()
}

/// Pick the image to program.
///
/// An explicit identifier wins; otherwise a single available image is used
/// and several are offered in a picker (a usage error in non-interactive mode).
pub(crate) fn resolve_firmware(
    source: &dyn FirmwareSource,
    explicit: Option<&str>,
    non_interactive: bool,
    quiet: bool,
) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id.to_string());
    }

    let mut available: Vec<FirmwareEntry> = source
        .list()?
        .into_iter()
        .filter(|entry| {
            entry
                .size
                .is_some()
        })
        .collect();

    if available.len() == 1 {
        if let Some(entry) = available.pop() {
            if !quiet {
                eprintln!(
                    "{} Using firmware {} ({})",
                    style("📦").cyan(),
                    entry.id,
                    entry.human_size()
                );
            }
            return Ok(entry.id);
        }
    }
    if available.is_empty() {
        return Err(CliError::Usage(
            "No firmware images found; pass a firmware identifier or --firmware-dir".to_string(),
        )
        .into());
    }

    if non_interactive {
        for entry in &available {
            eprintln!("  {} ({})", entry.id, entry.human_size());
        }
        return Err(CliError::Usage(format!(
            "Found multiple firmware images ({}); pass one explicitly in non-interactive mode",
            available.len()
        ))
        .into());
    }

    let labels: Vec<String> = available
        .iter()
        .map(|entry| format!("{} ({})", entry.id, entry.human_size()))
        .collect();
    let theme = ColorfulTheme::default();
    let selection = if use_fancy_output() {
        Select::with_theme(&theme)
    } else {
        Select::new()
    }
    .with_prompt("Select firmware")
    .items(&labels)
    .default(0)
    .interact_opt()
    .map_err(map_prompt_error)?;

    match selection.and_then(|idx| available.into_iter().nth(idx)) {
        Some(entry) => Ok(entry.id),
        None => Err(CliError::Cancelled("Firmware selection cancelled".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, [0u8; 64]).unwrap();
        }
        dir
    }

    #[test]
    fn test_empty_dir_falls_back_to_default_catalog() {
        let dir = tree(&[]);
        let entries = firmware_source(dir.path()).unwrap().list().unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, DEFAULT_CATALOG);
        assert!(entries[0].size.is_none());
    }

    #[test]
    fn test_dir_with_images_is_walked() {
        let dir = tree(&["firmware/a.bin", "b.bin"]);
        let entries = firmware_source(dir.path()).unwrap().list().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_explicit_id_wins() {
        let dir = tree(&["a.bin", "b.bin"]);
        let source = DirectorySource::new(dir.path());
        let id = resolve_firmware(&source, Some("b.bin"), true, true).unwrap();
        assert_eq!(id, "b.bin");
    }

    #[test]
    fn test_single_image_is_used() {
        let dir = tree(&["firmware/only.bin"]);
        let source = DirectorySource::new(dir.path());
        let id = resolve_firmware(&source, None, true, true).unwrap();
        assert_eq!(id, "firmware/only.bin");
    }

    #[test]
    fn test_missing_catalog_entries_are_not_candidates() {
        let dir = tree(&[]);
        let source = firmware_source(dir.path()).unwrap();
        let err = resolve_firmware(&source, None, true, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_multiple_images_non_interactive_is_usage_error() {
        let dir = tree(&["a.bin", "b.bin"]);
        let source = DirectorySource::new(dir.path());
        let err = resolve_firmware(&source, None, true, true).unwrap_err();
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn test_entries_json_shape() {
        let json = entries_json(&[FirmwareEntry::new("firmware/x.bin", Some(10))]);
        assert_eq!(json[0]["id"], "firmware/x.bin");
        assert_eq!(json[0]["name"], "x.bin");
        assert_eq!(json[0]["size"], 10);
        assert_eq!(json[0]["available"], true);
    }
}
