use crate::bbox::BoundingBox;
use crate::bucket::BucketConfig;
use crate::error::ConfigError;
use crate::fci::FciConfig;
use crate::firms::FirmsConfig;
use crate::hls::HlsConfig;
use crate::lsasaf::LsaSafConfig;
use crate::sentinel3_frp::Sentinel3FrpConfig;
use crate::window::TimeWindow;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;

/// Parameters shared by every pipeline of a run, plus optional per-pipeline tables.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RunConfig {
    pub run_name: String,
    pub output_folder: PathBuf,
    start_time: String,
    end_time: String,
    pub bbox: BoundingBox,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub fci: Option<FciConfig>,
    #[serde(default)]
    pub firms: Option<FirmsConfig>,
    #[serde(default)]
    pub sentinel3_frp: Option<Sentinel3FrpConfig>,
    #[serde(default)]
    pub hls: Option<HlsConfig>,
    #[serde(default)]
    pub lsasaf: Option<LsaSafConfig>,
    #[serde(default)]
    pub bucket: Option<BucketConfig>,
}

fn default_workers() -> usize {
    4
}

/// Template written by `eo-fetch template`.
pub fn run_config_toml() -> toml::Table {
    toml::toml! {
        run_name = "testrun"

        output_folder = "./outputs"

        // should be a full 10 minute time for FCI, like :00, :10, :20
        start_time = "2024-09-16T11:00:00"

        end_time = "2024-09-16T23:59:59"

        // West, South, East, North
        bbox = [26.5, 41.7, 27.3, 42.3]

        // 1 downloads sequentially
        workers = 4

        [fci]
        collections = ["EO:EUM:DAT:0665", "EO:EUM:DAT:0662"]
        coverage = []

        [firms]
        base_url = "https://firms.modaps.eosdis.nasa.gov"

        [sentinel3_frp]
        collection = "EO:EUM:DAT:0417"
        requested_file = "FRP_MWIR1km_standard.csv"
        header_lines = 19

        [hls]
        collections = ["HLSL30_2.0", "HLSS30_2.0"]

        // slots every 15 minutes from start_time
        [lsasaf]
        base_url = "https://mf2.ipma.pt/downloads/data/lsasaf/frp"
        slot_minutes = 15

        [bucket]
        prefixes = ["testfolder/"]
        pattern = "test*"
        target_dir = "./s3_data/"
    }
}

impl RunConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        // fail early on a malformed window
        config.window()?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())?;
        Ok(config)
    }

    pub fn window(&self) -> Result<TimeWindow, ConfigError> {
        TimeWindow::parse(&self.start_time, &self.end_time)
    }

    pub fn fci(&self) -> FciConfig {
        self.fci.clone().unwrap_or_default()
    }

    pub fn firms(&self) -> FirmsConfig {
        self.firms.clone().unwrap_or_default()
    }

    pub fn sentinel3_frp(&self) -> Sentinel3FrpConfig {
        self.sentinel3_frp.clone().unwrap_or_default()
    }

    pub fn hls(&self) -> HlsConfig {
        self.hls.clone().unwrap_or_default()
    }

    pub fn lsasaf(&self) -> LsaSafConfig {
        self.lsasaf.clone().unwrap_or_default()
    }

    /// Bucket downloads have no meaningful defaults.
    pub fn bucket(&self) -> Result<&BucketConfig, ConfigError> {
        self.bucket.as_ref().ok_or(ConfigError::MissingSection("bucket"))
    }
}
