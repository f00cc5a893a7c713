use std::{
    borrow::Cow,
    collections::HashMap,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::RwLock,
};

pub trait ConfigLoaderObject {
    fn key(&self) -> Cow<'static, str>;

    fn save(&self) -> eyre::Result<serde_json::Value>;
    fn restore(&mut self, value: serde_json::Value) -> eyre::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<HashMap<Cow<'static, str>, serde_json::Value>>>,
}

/// Location of the config file in the platform's config directory.
pub fn default_path() -> eyre::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "huefox", "grocery-scanner")
        .ok_or_else(|| eyre::eyre!("could not determine home directory"))?;

    Ok(dirs.config_dir().join("config.json"))
}

impl ConfigLoader {
    pub async fn read(path: &Path) -> eyre::Result<Self> {
        let mut file = tokio::fs::File::open(&path).await?;

        let mut buf = String::new();
        let _size = file.read_to_string(&mut buf).await?;

        let config = serde_json::from_str(&buf)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Reads the config at `path`, starting empty if it is missing or invalid.
    #[tracing::instrument]
    pub async fn read_or_default(path: &Path) -> Self {
        match Self::read(path).await {
            Ok(config) => config,
            Err(err) => {
                tracing::info!("using default config: {err}");
                Self::default()
            }
        }
    }

    /// Opens the config at `location`. Without a usable location the config
    /// only lives in memory, and no path is returned to save it to.
    pub async fn open(location: eyre::Result<PathBuf>) -> (Self, Option<PathBuf>) {
        match location {
            Ok(path) => (Self::read_or_default(&path).await, Some(path)),
            Err(err) => {
                tracing::warn!("settings will not be saved: {err}");
                (Self::default(), None)
            }
        }
    }

    pub async fn save(&self, path: &Path) -> eyre::Result<()> {
        let data = {
            let config = self.config.read().await;
            serde_json::to_vec_pretty(&*config)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(&data).await?;

        tracing::debug!(path = %path.display(), "saved config");

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key = %object.key()))]
    pub fn save_object<T>(&self, object: &T) -> eyre::Result<()>
    where
        T: ConfigLoaderObject,
    {
        tracing::debug!("saving object data");

        let data = object.save()?;
        self.config.blocking_write().insert(object.key(), data);

        Ok(())
    }

    /// Stores `object` and returns a future writing the whole config to `path`.
    pub fn persist<T>(
        &self,
        object: &T,
        path: &Path,
    ) -> eyre::Result<impl Future<Output = eyre::Result<()>> + Send + 'static>
    where
        T: ConfigLoaderObject,
    {
        self.save_object(object)?;

        let config = self.clone();
        let path = path.to_path_buf();

        Ok(async move { config.save(&path).await })
    }

    #[tracing::instrument(skip_all, fields(key = %object.key()))]
    pub fn restore_object<T>(&self, object: &mut T) -> eyre::Result<()>
    where
        T: ConfigLoaderObject,
    {
        tracing::debug!("loading object data");

        let data = match self.config.blocking_read().get(&object.key()) {
            Some(data) => data.to_owned(),
            None => {
                tracing::trace!("no data found for object");
                return Ok(());
            }
        };

        object.restore(data)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::nutrition::LookupSettings;

    use super::*;

    #[test]
    fn objects_round_trip_through_file() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = LookupSettings {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 3,
        };

        let config = ConfigLoader::default();
        config.save_object(&settings).unwrap();
        rt.block_on(config.save(&path)).unwrap();

        let config = rt.block_on(ConfigLoader::read(&path)).unwrap();
        let mut restored = LookupSettings::default();
        config.restore_object(&mut restored).unwrap();

        assert_eq!(restored, settings);
    }

    #[test]
    fn unknown_location_keeps_config_in_memory() {
        let rt = tokio::runtime::Runtime::new().unwrap();

        let (config, path) =
            rt.block_on(ConfigLoader::open(Err(eyre::eyre!("no home directory"))));
        assert!(path.is_none());

        let mut settings = LookupSettings::default();
        config.restore_object(&mut settings).unwrap();
        assert_eq!(settings, LookupSettings::default());
    }

    #[test]
    fn opening_missing_file_keeps_its_path() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("config.json");

        let (_config, path) = rt.block_on(ConfigLoader::open(Ok(location.clone())));
        assert_eq!(path, Some(location));
    }

    #[test]
    fn missing_object_keeps_defaults() {
        let config = ConfigLoader::default();

        let mut settings = LookupSettings::default();
        config.restore_object(&mut settings).unwrap();

        assert_eq!(settings, LookupSettings::default());
    }

    #[test]
    fn invalid_file_falls_back_to_default() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(rt.block_on(ConfigLoader::read(&path)).is_err());

        let config = rt.block_on(ConfigLoader::read_or_default(&path));
        let mut settings = LookupSettings::default();
        config.restore_object(&mut settings).unwrap();
        assert_eq!(settings, LookupSettings::default());
    }
}
