//! # Path Resolution Module
//!
//! Centralizza tutta la logica di calcolo dei path di output.
//!
//! ## Strategie:
//! - `Subfolder`: `<dir>/<nome>/<file>.<ext>` (sottocartella creata se manca)
//! - `Suffix`: `<dir>/<file><suffisso>.<ext>`, suffisso inserito prima di
//!   un'eventuale sequenza numerica (`photo_001` -> `photo_comp_001`)
//! - `Custom`: `<directory>/<file>.<ext>` con suffisso opzionale
//!
//! In caso di collisione aggiunge `_1`, `_2`, ... Il path scelto viene
//! riservato creando un file vuoto, così due job in parallelo non possono
//! scegliere lo stesso output.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_SUBFOLDER: &str = "compress";
pub const DEFAULT_SUFFIX: &str = "_comp";

/// Strategia di naming dell'output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum OutputStrategy {
    Subfolder { name: String },
    Suffix { suffix: String },
    Custom {
        directory: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
}

impl Default for OutputStrategy {
    fn default() -> Self {
        Self::Subfolder {
            name: DEFAULT_SUBFOLDER.to_string(),
        }
    }
}

/// Numbered sequence found at the end of a file stem
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sequence<'a> {
    prefix: &'a str,
    separator: &'a str,
    number: &'a str,
}

/// Rileva `name_001`, `name-001`, `name001` (max 5 cifre) o `name (3)`
fn detect_sequence(stem: &str) -> Option<Sequence<'_>> {
    if let Some(inner) = stem.strip_suffix(')') {
        if let Some(open) = inner.rfind('(') {
            let digits = &inner[open + 1..];
            let prefix = inner[..open].trim_end();
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && !prefix.is_empty() {
                return Some(Sequence {
                    prefix,
                    separator: " ",
                    number: &stem[open..],
                });
            }
        }
    }

    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let mut number = &stem[digits_start..];
    let mut head = &stem[..digits_start];
    if number.len() > 5 {
        // the prefix absorbs the extra leading digits
        let split = stem.len() - 5;
        number = &stem[split..];
        head = &stem[..split];
    }

    let (prefix, separator) = match head.char_indices().last() {
        Some((i, '_')) | Some((i, '-')) => (&head[..i], &head[i..]),
        _ => (head, ""),
    };
    if prefix.is_empty() {
        return None;
    }

    Some(Sequence {
        prefix,
        separator,
        number,
    })
}

/// True se lo stem termina già con il suffisso (anche numerato: `_comp_2`)
fn has_suffix(stem: &str, suffix: &str) -> bool {
    if stem.ends_with(suffix) {
        return true;
    }
    match stem.rfind('_') {
        Some(i) => {
            let digits = &stem[i + 1..];
            !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit())
                && stem[..i].ends_with(suffix)
        }
        None => false,
    }
}

/// Applica il suffisso a uno stem, senza duplicarlo
fn apply_suffix(stem: &str, suffix: &str) -> String {
    if suffix.is_empty() || has_suffix(stem, suffix) {
        return stem.to_string();
    }
    match detect_sequence(stem) {
        Some(seq) => format!("{}{}{}{}", seq.prefix, suffix, seq.separator, seq.number),
        None => format!("{}{}", stem, suffix),
    }
}

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Calcola (senza toccare il disco) il path desiderato per un input
    pub fn desired_path(
        input_path: &Path,
        directory: &Path,
        strategy: &OutputStrategy,
        extension: &str,
    ) -> std::io::Result<PathBuf> {
        let stem = input_path
            .file_stem()
            .ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("Invalid file name: {}", input_path.display()),
                )
            })?
            .to_string_lossy();

        let (dir, name) = match strategy {
            OutputStrategy::Subfolder { name } => (directory.join(name), stem.to_string()),
            OutputStrategy::Suffix { suffix } => (directory.to_path_buf(), apply_suffix(&stem, suffix)),
            OutputStrategy::Custom { directory: custom, suffix } => {
                let name = match suffix {
                    Some(suffix) => apply_suffix(&stem, suffix),
                    None => stem.to_string(),
                };
                (custom.clone(), name)
            }
        };

        Ok(dir.join(format!("{}.{}", name, extension)))
    }

    /// Risolve e riserva un path di output univoco, creando le directory necessarie
    pub async fn resolve(
        input_path: &Path,
        directory: &Path,
        strategy: &OutputStrategy,
        extension: &str,
    ) -> std::io::Result<PathBuf> {
        let desired = Self::desired_path(input_path, directory, strategy, extension)?;
        Self::ensure_parent_dirs(&desired).await?;
        let reserved = Self::reserve_unique(&desired).await?;
        debug!("Resolved output path: {} -> {}", input_path.display(), reserved.display());
        Ok(reserved)
    }

    /// Candidate path number `counter` for `base` (`name_1.ext`, `name_2.ext`, ...)
    fn candidate(base: &Path, counter: u32) -> PathBuf {
        if counter == 0 {
            return base.to_path_buf();
        }
        let stem = base.file_stem().unwrap_or_default().to_string_lossy();
        let name = match base.extension() {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext.to_string_lossy()),
            None => format!("{}_{}", stem, counter),
        };
        base.with_file_name(name)
    }

    async fn reserve_unique(base: &Path) -> std::io::Result<PathBuf> {
        let mut counter = 0;
        loop {
            let candidate = Self::candidate(base, counter);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Crea le directory parent se necessario
    pub async fn ensure_parent_dirs(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn suffix() -> OutputStrategy {
        OutputStrategy::Suffix {
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    #[test]
    fn test_detect_sequence() {
        let seq = detect_sequence("photo_001").unwrap();
        assert_eq!((seq.prefix, seq.separator, seq.number), ("photo", "_", "001"));

        let seq = detect_sequence("IMG-12").unwrap();
        assert_eq!((seq.prefix, seq.separator, seq.number), ("IMG", "-", "12"));

        let seq = detect_sequence("IMG0042").unwrap();
        assert_eq!((seq.prefix, seq.separator, seq.number), ("IMG", "", "0042"));

        let seq = detect_sequence("shot (3)").unwrap();
        assert_eq!((seq.prefix, seq.separator, seq.number), ("shot", " ", "(3)"));

        assert!(detect_sequence("holiday").is_none());
        assert!(detect_sequence("2024").is_none());
    }

    #[test]
    fn test_apply_suffix() {
        assert_eq!(apply_suffix("holiday", "_comp"), "holiday_comp");
        assert_eq!(apply_suffix("photo_001", "_comp"), "photo_comp_001");
        assert_eq!(apply_suffix("shot (3)", "_comp"), "shot_comp (3)");
        assert_eq!(apply_suffix("holiday_comp", "_comp"), "holiday_comp");
        assert_eq!(apply_suffix("holiday_comp_2", "_comp"), "holiday_comp_2");
    }

    #[test]
    fn test_desired_paths_per_strategy() {
        let input = Path::new("/photos/beach.png");
        let base = Path::new("/photos");

        let subfolder = PathResolver::desired_path(input, base, &OutputStrategy::default(), "jpg").unwrap();
        assert_eq!(subfolder, PathBuf::from("/photos/compress/beach.jpg"));

        let suffixed = PathResolver::desired_path(input, base, &suffix(), "jpg").unwrap();
        assert_eq!(suffixed, PathBuf::from("/photos/beach_comp.jpg"));

        let custom = OutputStrategy::Custom {
            directory: PathBuf::from("/out"),
            suffix: None,
        };
        let custom = PathResolver::desired_path(input, base, &custom, "png").unwrap();
        assert_eq!(custom, PathBuf::from("/out/beach.png"));
    }

    #[tokio::test]
    async fn test_resolve_reserves_unique_paths() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("beach.jpg");
        std::fs::write(&input, b"x").unwrap();

        let first = PathResolver::resolve(&input, dir.path(), &suffix(), "jpg").await.unwrap();
        let second = PathResolver::resolve(&input, dir.path(), &suffix(), "jpg").await.unwrap();

        assert_eq!(first, dir.path().join("beach_comp.jpg"));
        assert_eq!(second, dir.path().join("beach_comp_1.jpg"));
        assert!(first.exists() && second.exists());
    }

    #[tokio::test]
    async fn test_custom_never_overwrites_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("beach.jpg");
        std::fs::write(&input, b"original").unwrap();
        let strategy = OutputStrategy::Custom {
            directory: dir.path().to_path_buf(),
            suffix: None,
        };

        let resolved = PathResolver::resolve(&input, dir.path(), &strategy, "jpg").await.unwrap();
        assert_eq!(resolved, dir.path().join("beach_1.jpg"));
        assert_eq!(std::fs::read(&input).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_subfolder_is_created() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("beach.jpg");
        let resolved = PathResolver::resolve(&input, dir.path(), &OutputStrategy::default(), "jpg")
            .await
            .unwrap();
        assert!(dir.path().join(DEFAULT_SUBFOLDER).is_dir());
        assert_eq!(resolved.parent().unwrap(), dir.path().join(DEFAULT_SUBFOLDER));
    }

    #[test]
    fn test_strategy_serde() {
        let json = serde_json::to_string(&suffix()).unwrap();
        assert_eq!(json, r#"{"strategy":"suffix","suffix":"_comp"}"#);
        let parsed: OutputStrategy =
            serde_json::from_str(r#"{"strategy":"custom","directory":"/out"}"#).unwrap();
        assert_eq!(
            parsed,
            OutputStrategy::Custom {
                directory: PathBuf::from("/out"),
                suffix: None
            }
        );
    }
}
