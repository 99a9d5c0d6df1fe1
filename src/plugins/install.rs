//! Installing plugin units from files and archives

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::info;

use crate::error::{Error, Result};

/// Unit files are `*.json`; names starting with `__` are helpers, not units
pub fn is_unit_file(path: &Path) -> bool {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("__"))
        .unwrap_or(true);
    is_json && !hidden
}

pub fn unit_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallKind {
    Unit,
    Zip,
    Tar,
    TarGz,
}

fn install_kind(source: &Path) -> Result<InstallKind> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.ends_with(".json") {
        Ok(InstallKind::Unit)
    } else if name.ends_with(".zip") {
        Ok(InstallKind::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(InstallKind::TarGz)
    } else if name.ends_with(".tar") {
        Ok(InstallKind::Tar)
    } else {
        Err(Error::UnsupportedFormat(format!(
            "{} (expect .json, .zip, .tar, .tar.gz or .tgz)",
            source.display()
        )))
    }
}

/// Archive member paths must stay inside the target directory
fn safe_relative(name: &Path) -> Result<PathBuf> {
    if name.is_absolute()
        || name
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(Error::Archive(format!(
            "unsupported or malicious path in archive: {}",
            name.display()
        )));
    }
    Ok(name.components().collect())
}

/// Copy a unit file or extract an archive into `plugins_dir`.
/// Returns the unit names found among the installed files.
pub fn install(source: &Path, plugins_dir: &Path) -> Result<Vec<String>> {
    let kind = install_kind(source)?;
    fs::metadata(source).map_err(|e| Error::io(source, e))?;
    fs::create_dir_all(plugins_dir).map_err(|e| Error::io(plugins_dir, e))?;

    let written = match kind {
        InstallKind::Unit => {
            let file_name = source
                .file_name()
                .ok_or_else(|| Error::Validation(format!("invalid path: {}", source.display())))?;
            let dest = plugins_dir.join(file_name);
            fs::copy(source, &dest).map_err(|e| Error::io(&dest, e))?;
            vec![dest]
        }
        InstallKind::Zip => extract_zip(source, plugins_dir)?,
        InstallKind::Tar => {
            let file = fs::File::open(source).map_err(|e| Error::io(source, e))?;
            extract_tar(file, plugins_dir)?
        }
        InstallKind::TarGz => {
            let file = fs::File::open(source).map_err(|e| Error::io(source, e))?;
            extract_tar(GzDecoder::new(file), plugins_dir)?
        }
    };

    let mut units: Vec<String> = written
        .iter()
        .filter(|p| is_unit_file(p))
        .filter_map(|p| unit_name(p))
        .collect();
    units.sort();
    units.dedup();
    info!(
        "Installed {} into {}: units {:?}",
        source.display(),
        plugins_dir.display(),
        units
    );
    Ok(units)
}

fn extract_zip(zip_path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(zip_path).map_err(|e| Error::io(zip_path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::Archive(format!("invalid zip archive: {}", e)))?;

    // Check every member before writing anything
    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| Error::Archive(format!("zip entry error: {}", e)))?;
        let relative = safe_relative(Path::new(entry.name()))?;
        members.push((relative, entry.is_dir()));
    }

    let mut written = Vec::new();
    for (i, (relative, is_dir)) in members.into_iter().enumerate() {
        let out_path = out_dir.join(&relative);
        if is_dir {
            fs::create_dir_all(&out_path).map_err(|e| Error::io(&out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Archive(format!("zip entry error: {}", e)))?;
        let mut out = fs::File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::io(&out_path, e))?;
        written.push(out_path);
    }
    Ok(written)
}

enum TarMember {
    Dir(PathBuf),
    File(PathBuf, Vec<u8>),
}

fn extract_tar<R: Read>(reader: R, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::Archive(format!("invalid tar archive: {}", e)))?;

    // Tar is read sequentially, so members are buffered until every path
    // has been checked
    let mut members = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Archive(format!("tar entry error: {}", e)))?;
        let name = entry
            .path()
            .map_err(|e| Error::Archive(format!("tar entry path: {}", e)))?
            .into_owned();
        let relative = safe_relative(&name)?;

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            members.push(TarMember::Dir(relative));
        } else if kind.is_file() {
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::Archive(format!("tar entry {}: {}", name.display(), e)))?;
            members.push(TarMember::File(relative, data));
        }
    }

    let mut written = Vec::new();
    for member in members {
        match member {
            TarMember::Dir(relative) => {
                let out_path = out_dir.join(relative);
                fs::create_dir_all(&out_path).map_err(|e| Error::io(&out_path, e))?;
            }
            TarMember::File(relative, data) => {
                let out_path = out_dir.join(relative);
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                }
                fs::write(&out_path, data).map_err(|e| Error::io(&out_path, e))?;
                written.push(out_path);
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const UNIT: &[u8] = br#"{"name": "Tools/X", "actions": []}"#;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            // Name bytes are written directly so traversal paths can be built
            let mut header = tar::Header::new_gnu();
            let field = &mut header.as_gnu_mut().unwrap().name;
            field[..name.len()].copy_from_slice(name.as_bytes());
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_is_unit_file() {
        assert!(is_unit_file(Path::new("/p/tools.json")));
        assert!(is_unit_file(Path::new("/p/TOOLS.JSON")));
        assert!(!is_unit_file(Path::new("/p/__init__.json")));
        assert!(!is_unit_file(Path::new("/p/readme.md")));
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plugin.rar");
        fs::write(&source, b"x").unwrap();
        assert!(matches!(
            install(&source, &dir.path().join("plugins")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_single_unit_copied() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("my_tool.json");
        fs::write(&source, UNIT).unwrap();
        let plugins = dir.path().join("plugins");
        assert_eq!(install(&source, &plugins).unwrap(), vec!["my_tool"]);
        assert_eq!(fs::read(plugins.join("my_tool.json")).unwrap(), UNIT);
    }

    #[test]
    fn test_tar_gz_extracted_in_place() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&tar_bytes(&[("pack/alpha.json", UNIT), ("pack/notes.txt", b"hi")]))
            .unwrap();
        let source = dir.path().join("pack.tgz");
        fs::write(&source, enc.finish().unwrap()).unwrap();

        let plugins = dir.path().join("plugins");
        assert_eq!(install(&source, &plugins).unwrap(), vec!["alpha"]);
        assert!(plugins.join("pack/alpha.json").exists());
        assert!(plugins.join("pack/notes.txt").exists());
    }

    #[test]
    fn test_tar_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("evil.tar");
        fs::write(&source, tar_bytes(&[("ok.json", UNIT), ("x/../../escape.json", UNIT)])).unwrap();

        let plugins = dir.path().join("plugins");
        assert!(matches!(install(&source, &plugins), Err(Error::Archive(_))));
        assert!(!plugins.join("ok.json").exists());
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn test_zip_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("evil.zip");
        let mut zip = zip::ZipWriter::new(fs::File::create(&source).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("ok.json", options).unwrap();
        zip.write_all(UNIT).unwrap();
        zip.start_file("../escape.json", options).unwrap();
        zip.write_all(UNIT).unwrap();
        zip.finish().unwrap();

        let plugins = dir.path().join("plugins");
        assert!(matches!(install(&source, &plugins), Err(Error::Archive(_))));
        assert!(!plugins.join("ok.json").exists());
        assert!(!dir.path().join("escape.json").exists());
    }
}
