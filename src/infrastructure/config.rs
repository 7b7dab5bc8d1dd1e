use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_create_database")]
    pub create_database: bool,
    #[serde(default = "default_download_path")]
    pub download_path: String,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub wifi_only: bool,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: yomikomi_home().join("config.yml"),
            database_path: default_database_path(),
            create_database: default_create_database(),
            download_path: default_download_path(),
            cache_path: default_cache_path(),
            max_concurrent: default_max_concurrent(),
            wifi_only: false,
            read_timeout: default_read_timeout(),
        }
    }
}

fn yomikomi_home() -> PathBuf {
    match std::env::var("YOMIKOMI_HOME") {
        Ok(path) => PathBuf::from(path),
        Err(_) => dirs::home_dir()
            .expect("should have home")
            .join(".yomikomi"),
    }
}

fn default_database_path() -> String {
    let path = yomikomi_home();
    if !path.exists() {
        let _ = std::fs::create_dir_all(&path);
    }
    path.join("yomikomi.db").display().to_string()
}

fn default_create_database() -> bool {
    true
}

fn default_download_path() -> String {
    let path = yomikomi_home().join("downloads");
    if !path.exists() {
        let _ = std::fs::create_dir_all(&path);
    }
    path.display().to_string()
}

fn default_cache_path() -> String {
    let path = yomikomi_home().join("cache");
    if !path.exists() {
        let _ = std::fs::create_dir_all(&path);
    }
    path.display().to_string()
}

fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(1)
        .min(5)
}

fn default_read_timeout() -> u64 {
    30
}

impl Config {
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Config, anyhow::Error> {
        let config_path = match path {
            Some(p) => PathBuf::new().join(p),
            None => yomikomi_home().join("config.yml"),
        };

        match std::fs::File::open(config_path.clone()) {
            Ok(file) => {
                info!("Open config from {:?}", config_path);
                let mut cfg: Self = serde_yml::from_reader(file)?;
                cfg.path = config_path;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Config {
                    path: config_path,
                    ..Default::default()
                };
                cfg.save()?;
                info!("Write default config at {:?}", cfg.path);
                Ok(cfg)
            }
        }
    }

    pub fn save(&self) -> Result<(), anyhow::Error> {
        std::fs::write(&self.path, serde_yml::to_string(&self)?)?;

        Ok(())
    }
}
