//! File-based loading of streaming settings.

use std::fs;

use anyhow::Result;
use ferrex_texture_upload::{ConfigError, ConfigLoadError, StreamingConfig};
use tempfile::TempDir;

#[test]
fn toml_file_overrides_selected_fields() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("texture_upload.toml");
    fs::write(
        &path,
        "enable_pbo_streaming = true\n\
         force_disable_persistent = true\n\
         max_bytes_per_frame = 4194304\n",
    )?;

    let config = StreamingConfig::load_from_file(&path)?;
    assert!(config.force_disable_persistent);
    assert_eq!(config.max_bytes_per_frame, 4 * 1024 * 1024);
    assert_eq!(
        config.max_uploads_per_frame,
        StreamingConfig::default().max_uploads_per_frame
    );
    Ok(())
}

#[test]
fn json_file_is_accepted() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("upload.json");
    fs::write(
        &path,
        r#"{ "use_coherent_mapping": false, "pbo_alignment": 64 }"#,
    )?;

    let config = StreamingConfig::load_from_file(&path)?;
    assert!(!config.use_coherent_mapping);
    assert_eq!(config.pbo_alignment, 64);
    Ok(())
}

#[test]
fn non_json_extensions_are_read_as_toml() -> Result<()> {
    let dir = TempDir::new()?;
    let toml_path = dir.path().join("upload.conf");
    fs::write(&toml_path, "max_staging_bytes = 1024\n")?;
    let config = StreamingConfig::load_from_file(&toml_path)?;
    assert_eq!(config.max_staging_bytes, 1024);

    let json_path = dir.path().join("upload.cfg");
    fs::write(&json_path, r#"{"max_staging_bytes": 2048}"#)?;
    let err = StreamingConfig::load_from_file(&json_path).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Toml { .. }), "{err:?}");
    Ok(())
}

#[test]
fn invalid_values_are_rejected_with_context() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("texture_upload.toml");
    fs::write(&path, "pbo_alignment = 100\n")?;

    let err = StreamingConfig::load_from_file(&path).unwrap_err();
    assert_eq!(err.invalid(), Some(&ConfigError::InvalidAlignment(100)));
    assert!(err.to_string().contains("texture_upload.toml"), "{err}");

    let message = format!("{:#}", anyhow::Error::from(err));
    assert!(message.contains("power of two"), "{message}");
    Ok(())
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("absent.toml");

    let err = StreamingConfig::load_from_file(&path).unwrap_err();
    match err {
        ConfigLoadError::Read { path: reported, source } => {
            assert_eq!(reported, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected a read error, got {other:?}"),
    }
}
