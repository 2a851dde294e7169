use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::origin::Domain;
use crate::services::insight_service::InsightStore;

/// What a duplicate policy gets to look at for one move.
pub struct DuplicateCandidate<'a> {
    pub file_name: &'a str,
    pub domain: &'a Domain,
    pub destination_dir: &'a Path,
}

/// Decides the `is_duplicate` attribute attached to a move.
pub trait DuplicatePolicy: Send + Sync {
    fn is_duplicate(&self, candidate: &DuplicateCandidate<'_>) -> bool;
}

pub struct NeverDuplicate;

impl DuplicatePolicy for NeverDuplicate {
    fn is_duplicate(&self, _candidate: &DuplicateCandidate<'_>) -> bool {
        false
    }
}

/// Flags a file when the same domain already logged a file of the same
/// canonical name, so `report (1).pdf` repeats `report.pdf`.
pub struct PreviouslyLogged {
    store: InsightStore,
}

impl PreviouslyLogged {
    pub fn new(store: InsightStore) -> Self {
        Self { store }
    }
}

impl DuplicatePolicy for PreviouslyLogged {
    fn is_duplicate(&self, candidate: &DuplicateCandidate<'_>) -> bool {
        let wanted = canonical_download_name(candidate.file_name);
        match self.store.paths_for_domain(candidate.domain.as_str()) {
            Ok(paths) => paths.iter().any(|logged| {
                Path::new(logged)
                    .file_name()
                    .map(|name| canonical_download_name(&name.to_string_lossy()) == wanted)
                    .unwrap_or(false)
            }),
            Err(e) => {
                tracing::warn!("duplicate lookup failed for {}: {e}", candidate.file_name);
                false
            }
        }
    }
}

/// Lowercased file name without a browser-added ` (N)` counter.
pub fn canonical_download_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    let trimmed = match stem.strip_suffix(')').and_then(|s| s.rsplit_once(" (")) {
        Some((base, counter))
            if !base.is_empty() && !counter.is_empty() && counter.chars().all(|c| c.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => stem,
    };

    let joined = match ext {
        Some(ext) => format!("{trimmed}.{ext}"),
        None => trimmed,
    };
    joined.to_lowercase()
}

/// `<root>/<domain>`, created on demand.
pub fn domain_folder(root: &Path, domain: &Domain) -> Result<PathBuf, AppError> {
    let target = root.join(domain.as_str());
    fs::create_dir_all(&target)?;
    Ok(target)
}

fn is_cross_device(err: &io::Error) -> bool {
    // EXDEV / ERROR_NOT_SAME_DEVICE
    if cfg!(windows) {
        err.raw_os_error() == Some(17)
    } else {
        err.raw_os_error() == Some(18)
    }
}

fn move_file(source: &Path, destination: &Path) -> Result<(), AppError> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => copy_then_remove(source, destination),
        Err(e) => Err(e.into()),
    }
}

/// Leaves either the source or a complete destination, never both.
fn copy_then_remove(source: &Path, destination: &Path) -> Result<(), AppError> {
    if let Err(copy_err) = fs::copy(source, destination) {
        let _ = fs::remove_file(destination);
        return Err(copy_err.into());
    }
    if let Err(remove_err) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(remove_err.into());
    }
    Ok(())
}

/// Moves `source` into its domain folder under `root`, keeping the base name.
/// An existing file at the destination is never overwritten.
pub fn relocate(source: &Path, root: &Path, domain: &Domain) -> Result<PathBuf, AppError> {
    if !source.is_file() {
        return Err(AppError::General(format!(
            "source does not exist: {}",
            source.display()
        )));
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| AppError::General(format!("invalid source path: {}", source.display())))?;

    let target_dir = domain_folder(root, domain)?;
    let destination = target_dir.join(file_name);
    if destination.exists() {
        return Err(AppError::General(format!(
            "destination already exists: {}",
            destination.display()
        )));
    }

    move_file(source, &destination)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::insight::EventKind;

    fn resolved(label: &str) -> Domain {
        Domain::Resolved(label.to_string())
    }

    #[test]
    fn test_relocate_into_domain_folder() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("file.txt");
        fs::write(&src, b"data").unwrap();

        let dest = relocate(&src, base.path(), &resolved("github")).unwrap();

        assert!(!src.exists());
        assert_eq!(dest, base.path().join("github").join("file.txt"));
        assert_eq!(fs::read(&dest).unwrap(), b"data");
    }

    #[test]
    fn test_unresolved_goes_to_sentinel_folder() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("mystery.bin");
        fs::write(&src, b"?").unwrap();

        let dest = relocate(&src, base.path(), &Domain::Unresolved).unwrap();
        assert_eq!(dest, base.path().join("unknown_domain").join("mystery.bin"));
    }

    #[test]
    fn test_collision_leaves_file_in_place() {
        let base = tempfile::tempdir().unwrap();
        let src = base.path().join("file.txt");
        fs::write(&src, b"new").unwrap();
        fs::create_dir_all(base.path().join("github")).unwrap();
        fs::write(base.path().join("github").join("file.txt"), b"old").unwrap();

        let result = relocate(&src, base.path(), &resolved("github"));

        assert!(result.is_err());
        assert!(src.exists());
        assert_eq!(
            fs::read(base.path().join("github").join("file.txt")).unwrap(),
            b"old"
        );
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let base = tempfile::tempdir().unwrap();
        let result = relocate(&base.path().join("nope.txt"), base.path(), &resolved("x"));
        assert!(result.is_err());
        assert!(!base.path().join("x").exists());
    }

    #[test]
    fn cross_device_copy_moves_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.zip");
        let destination = dir.path().join("b.zip");
        fs::write(&source, b"payload").unwrap();

        copy_then_remove(&source, &destination).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"payload");
    }

    #[test]
    fn failed_cross_device_copy_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let unreadable = dir.path().join("folder.zip");
        fs::create_dir(&unreadable).unwrap();
        let destination = dir.path().join("github").join("folder.zip");
        fs::create_dir_all(destination.parent().unwrap()).unwrap();

        assert!(copy_then_remove(&unreadable, &destination).is_err());
        assert!(!destination.exists());
        assert!(unreadable.is_dir());

        let missing = dir.path().join("gone.zip");
        assert!(copy_then_remove(&missing, &destination).is_err());
        assert!(!destination.exists());
    }

    #[test]
    fn canonical_name_drops_browser_counter() {
        assert_eq!(canonical_download_name("report (1).pdf"), "report.pdf");
        assert_eq!(canonical_download_name("Report (12).PDF"), "report.pdf");
        assert_eq!(canonical_download_name("report.pdf"), "report.pdf");
        assert_eq!(canonical_download_name("notes (draft).txt"), "notes (draft).txt");
        assert_eq!(canonical_download_name("(1).txt"), "(1).txt");
        assert_eq!(canonical_download_name("archive (2)"), "archive");
    }

    #[test]
    fn previously_logged_policy_matches_same_domain_only() {
        let home = tempfile::tempdir().unwrap();
        let folder = tempfile::tempdir().unwrap();
        let store = InsightStore::at(home.path().join("store"), folder.path());
        store.initialize().unwrap();
        store
            .append(
                EventKind::Moved,
                &folder.path().join("github").join("tool.zip"),
                &resolved("github"),
                Some("https://github.com/tool.zip"),
                false,
            )
            .unwrap();

        let policy = PreviouslyLogged::new(store);
        let dir = folder.path().join("github");
        let github = resolved("github");
        let gitlab = resolved("gitlab");

        assert!(policy.is_duplicate(&DuplicateCandidate {
            file_name: "tool (1).zip",
            domain: &github,
            destination_dir: &dir,
        }));
        assert!(!policy.is_duplicate(&DuplicateCandidate {
            file_name: "tool (1).zip",
            domain: &gitlab,
            destination_dir: &dir,
        }));
        assert!(!NeverDuplicate.is_duplicate(&DuplicateCandidate {
            file_name: "tool.zip",
            domain: &github,
            destination_dir: &dir,
        }));
    }
}
