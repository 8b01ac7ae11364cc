//! Path based loading and saving of every supported asset.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::{
    common::{Buffer, MutableBuffer},
    config::{Config, LoadOptions, SaveOptions},
    csv_model::CsvModel,
    error::{MmdError, Result},
    json,
    model::Model,
    motion::Motion,
    vpd, xfile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Pmx,
    Vmd,
    Vpd,
    X,
    Csv,
    Json,
}

impl AssetKind {
    pub fn from_path(path: &Path) -> Result<AssetKind> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pmx" => Ok(AssetKind::Pmx),
            "vmd" => Ok(AssetKind::Vmd),
            "vpd" => Ok(AssetKind::Vpd),
            "x" => Ok(AssetKind::X),
            "csv" => Ok(AssetKind::Csv),
            "json" => Ok(AssetKind::Json),
            _ => Err(MmdError::UnsupportedExtension {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AssetKind::Pmx => "pmx",
            AssetKind::Vmd => "vmd",
            AssetKind::Vpd => "vpd",
            AssetKind::X => "x",
            AssetKind::Csv => "csv",
            AssetKind::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Asset {
    Model(Model),
    Motion(Motion),
    Csv(CsvModel),
}

impl Asset {
    pub fn name(&self) -> &str {
        match self {
            Asset::Model(model) => &model.name,
            Asset::Motion(motion) => &motion.name,
            Asset::Csv(csv) => &csv.name,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            Asset::Model(model) => &model.hash,
            Asset::Motion(motion) => &motion.hash,
            Asset::Csv(csv) => &csv.hash,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Asset::Model(model) => &model.path,
            Asset::Motion(motion) => &motion.path,
            Asset::Csv(csv) => &csv.path,
        }
    }

    fn set_identity(&mut self, path: String, hash: String) {
        let (target_path, target_hash) = match self {
            Asset::Model(model) => (&mut model.path, &mut model.hash),
            Asset::Motion(motion) => (&mut motion.path, &mut motion.hash),
            Asset::Csv(csv) => (&mut csv.path, &mut csv.hash),
        };
        *target_path = path;
        *target_hash = hash;
    }
}

/// The absolute form of `path` when it exists, else `path` itself.
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercase hex SHA-1 of the file bytes followed by the path bytes.
pub fn hash_bytes(bytes: &[u8], path: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Repository {
    pub load_options: LoadOptions,
    pub save_options: SaveOptions,
}

impl From<Config> for Repository {
    fn from(config: Config) -> Self {
        Self {
            load_options: config.load,
            save_options: config.save,
        }
    }
}

impl Repository {
    pub fn new(load_options: LoadOptions, save_options: SaveOptions) -> Self {
        Self {
            load_options,
            save_options,
        }
    }

    pub fn can_load(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        path.is_file() && AssetKind::from_path(path).is_ok()
    }

    pub fn hash(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(hash_bytes(&bytes, &resolve(path).to_string_lossy()))
    }

    /// Reads only as much as needed for the name. Formats without a stored name use the file
    /// stem.
    pub fn load_name(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let read = || std::fs::read(path);
        match AssetKind::from_path(path)? {
            AssetKind::Pmx => Model::load_name(&mut Buffer::create(&read()?)),
            AssetKind::Vmd => Motion::load_name(&mut Buffer::create(&read()?)),
            AssetKind::Vpd => vpd::load_name(&read()?),
            AssetKind::Json => json::load_name(&String::from_utf8_lossy(&read()?)),
            AssetKind::X | AssetKind::Csv => Ok(file_stem(path)),
        }
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Asset> {
        let path = path.as_ref();
        let kind = AssetKind::from_path(path)?;
        let bytes = std::fs::read(path)?;
        log::info!("loading {} ({} bytes)", path.display(), bytes.len());
        let options = &self.load_options;
        let mut asset = match kind {
            AssetKind::Pmx => Asset::Model(Model::load_from_buffer(
                &mut Buffer::create(&bytes),
                options,
            )?),
            AssetKind::Vmd => Asset::Motion(Motion::load_from_buffer(&mut Buffer::create(&bytes))?),
            AssetKind::Vpd => Asset::Motion(vpd::load_from_bytes(&bytes)?),
            AssetKind::X => {
                let mut model = xfile::load_from_bytes(&bytes, options)?;
                model.name = file_stem(path);
                Asset::Model(model)
            }
            AssetKind::Csv => {
                let mut csv = CsvModel::load_from_bytes(&bytes)?;
                csv.name = file_stem(path);
                Asset::Csv(csv)
            }
            AssetKind::Json => Asset::Model(json::load_from_str(&String::from_utf8_lossy(&bytes))?),
        };
        let resolved = resolve(path).to_string_lossy().into_owned();
        let hash = if options.compute_hash {
            hash_bytes(&bytes, &resolved)
        } else {
            String::new()
        };
        asset.set_identity(resolved, hash);
        Ok(asset)
    }

    pub fn load_model(&self, path: impl AsRef<Path>) -> Result<Model> {
        match self.load(path)? {
            Asset::Model(model) => Ok(model),
            _ => Err(MmdError::UnsupportedModel { expected: "model" }),
        }
    }

    pub fn load_motion(&self, path: impl AsRef<Path>) -> Result<Motion> {
        match self.load(path)? {
            Asset::Motion(motion) => Ok(motion),
            _ => Err(MmdError::UnsupportedModel { expected: "motion" }),
        }
    }

    /// Encodes `asset` in the format named by the extension of `path`.
    pub fn save_to_bytes(&self, path: impl AsRef<Path>, asset: &Asset) -> Result<Vec<u8>> {
        let kind = AssetKind::from_path(path.as_ref())?;
        let options = &self.save_options;
        match (kind, asset) {
            (AssetKind::Pmx, Asset::Model(model)) => {
                let mut buffer = MutableBuffer::create()?;
                model.save_to_buffer(&mut buffer, options)?;
                Ok(buffer.into_bytes())
            }
            (AssetKind::Vmd, Asset::Motion(motion)) => {
                let mut buffer = MutableBuffer::create()?;
                motion.save_to_buffer(&mut buffer, options)?;
                Ok(buffer.into_bytes())
            }
            (AssetKind::Json, Asset::Model(model)) => Ok(json::save_to_string(model)?.into_bytes()),
            (AssetKind::Csv, Asset::Csv(csv)) => csv.save_to_bytes(),
            (AssetKind::Pmx | AssetKind::Json, _) => {
                Err(MmdError::UnsupportedModel { expected: "model" })
            }
            (AssetKind::Vmd, _) => Err(MmdError::UnsupportedModel { expected: "motion" }),
            (AssetKind::Csv, _) => Err(MmdError::UnsupportedModel { expected: "csv" }),
            (AssetKind::Vpd | AssetKind::X, _) => Err(MmdError::UnsupportedExtension {
                path: path.as_ref().display().to_string(),
            }),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>, asset: &Asset) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.save_to_bytes(path, asset)?;
        std::fs::write(path, &bytes)?;
        log::info!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(AssetKind::Pmx, AssetKind::from_path(Path::new("a/b.PMX")).unwrap());
        assert_eq!(AssetKind::X, AssetKind::from_path(Path::new("mesh.x")).unwrap());
        assert_eq!(AssetKind::Json, AssetKind::from_path(Path::new("b.Json")).unwrap());
        assert!(matches!(
            AssetKind::from_path(Path::new("readme.txt")),
            Err(MmdError::UnsupportedExtension { .. })
        ));
        assert!(AssetKind::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_hash_bytes() {
        // sha1("abc")
        assert_eq!(
            "a9993e364706816aba3e25717850c26c9cd0d89d",
            hash_bytes(b"ab", "c")
        );
    }

    #[test]
    fn test_mismatched_save() {
        let repository = Repository::default();
        let asset = Asset::Csv(CsvModel::default());
        assert!(matches!(
            repository.save_to_bytes("out.pmx", &asset),
            Err(MmdError::UnsupportedModel { expected: "model" })
        ));
        assert!(matches!(
            repository.save_to_bytes("out.vpd", &asset),
            Err(MmdError::UnsupportedExtension { .. })
        ));
    }
}
