// vim: tw=80
use std::{
    path::PathBuf,
    sync::Arc,
};

use clap::{crate_version, Parser};
use divbuf::DivBufShared;
use futures::future;
use sbdd_core::{
    config::{DispatchMode, StripeConfig},
    device::RaidDevice,
    disk::DeviceProvider,
    file_disk::{FileDisk, FileProvider},
    mem_disk::MemProvider,
    stripe::Raid0Locator,
    Error,
    Result,
    SectorT,
    bytes2sectors,
    sectors2bytes,
};
use serde_derive::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
/// Print the device's geometry and members
struct Info {}

impl Info {
    fn main(self, dev: &RaidDevice) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(&dev.status())
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        print!("{yaml}");
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Show where a sector of the striped device is stored
struct Map {
    /// Sector of the striped device
    #[clap(long)]
    sector: SectorT,
}

#[derive(Debug, Serialize)]
struct Mapping<'a> {
    sector: SectorT,
    disk: usize,
    name: &'a str,
    target: SectorT,
}

impl Map {
    fn main(self, dev: &RaidDevice) -> Result<()> {
        if self.sector >= dev.capacity() {
            return Err(Error::InvalidArgument(format!(
                "sector {} is past the end of the device ({} sectors)",
                self.sector, dev.capacity())));
        }
        let config = dev.config();
        let locator = Raid0Locator::new(config.chunk_sectors(),
                                        config.ndisks());
        let loc = locator.map(self.sector);
        let mapping = Mapping {
            sector: self.sector,
            disk: loc.disk,
            name: &config.disks()[loc.disk],
            target: loc.sector
        };
        let yaml = serde_yaml_ng::to_string(&mapping)
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        print!("{yaml}");
        Ok(())
    }
}

/// Split `[sector, sector + count)` into requests the device will accept
fn pieces(dev: &RaidDevice, sector: SectorT, count: SectorT)
    -> Result<impl Iterator<Item=(SectorT, SectorT)>>
{
    if sector.checked_add(count).is_none() {
        return Err(Error::InvalidArgument(format!(
            "{count} sectors at sector {sector} overflows")));
    }
    let max = dev.max_transfer().max(1);
    Ok((0..count.div_ceil(max)).map(move |i| {
        let start = i * max;
        (sector + start, max.min(count - start))
    }))
}

#[derive(Parser, Clone, Debug)]
/// Read sectors and dump them in hex
struct Read {
    /// First sector to read
    #[clap(long)]
    sector: SectorT,
    /// Number of sectors to read
    #[clap(long, default_value_t = 1)]
    count: SectorT,
}

impl Read {
    async fn main(self, dev: &RaidDevice) -> Result<()> {
        let dbs = DivBufShared::from(vec![0u8; sectors2bytes(self.count)]);
        let mut buf = dbs.try_mut()
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let futs = pieces(dev, self.sector, self.count)?
            .map(|(sector, n)| {
                debug!(sector, n, "reading");
                dev.read_at(buf.split_to(sectors2bytes(n)), sector)
            }).collect::<Vec<_>>();
        drop(buf);
        future::try_join_all(futs).await?;
        let data = dbs.try_const()
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        hexdump::hexdump(&data[..]);
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
/// Write a file's contents, zero-padded to a whole number of sectors
struct Write {
    /// First sector to write
    #[clap(long)]
    sector: SectorT,
    /// File to write
    #[clap(long)]
    input: PathBuf,
}

impl Write {
    async fn main(self, dev: &RaidDevice) -> Result<()> {
        let mut data = std::fs::read(&self.input)?;
        let count = bytes2sectors(data.len() + sbdd_core::SECTOR_SIZE - 1);
        data.resize(sectors2bytes(count), 0);
        let dbs = DivBufShared::from(data);
        let mut buf = dbs.try_const()
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let futs = pieces(dev, self.sector, count)?
            .map(|(sector, n)| {
                debug!(sector, n, "writing");
                dev.write_at(buf.split_to(sectors2bytes(n)), sector)
            }).collect::<Vec<_>>();
        future::try_join_all(futs).await?;
        println!("wrote {count} sectors at sector {}", self.sector);
        Ok(())
    }
}

#[derive(Parser, Clone, Debug)]
enum SubCommand {
    Info(Info),
    Map(Map),
    Read(Read),
    Write(Write),
}

#[derive(Parser, Clone, Debug)]
#[clap(version = crate_version!())]
/// Striped (RAID-0) block device
struct Cli {
    /// RAID level.  Only 0, plain striping, is supported.
    #[clap(long, default_value_t = 0)]
    raid_type: u64,
    /// Layout of the device, like "stripe=4;disks=/dev/da0,/dev/da1"
    #[clap(long)]
    raid_config: String,
    /// How requests are dispatched: "inline" or "queued"
    #[clap(long, default_value_t = DispatchMode::Inline)]
    mode: DispatchMode,
    /// Use fresh RAM disks of this many sectors instead of opening the named
    /// disks
    #[clap(long)]
    mem: Option<SectorT>,
    /// Largest single transfer to each member disk, in sectors
    #[clap(long, default_value_t = FileDisk::DEFAULT_MAX_TRANSFER)]
    max_transfer: SectorT,
    #[clap(subcommand)]
    cmd: SubCommand,
}

impl Cli {
    fn provider(&self) -> Result<Arc<dyn DeviceProvider>> {
        match self.mem {
            Some(sectors) => {
                let config = self.raid_config.parse::<StripeConfig>()?;
                Ok(Arc::new(MemProvider::with_disks(config.disks(), sectors,
                                                    self.max_transfer)))
            }
            None => Ok(Arc::new(FileProvider::new(self.max_transfer)))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli: Cli = Cli::parse();
    let provider = cli.provider()?;
    let params = sbdd_core::config::Params {
        raid_type: cli.raid_type,
        raid_config: cli.raid_config.clone(),
        mode: cli.mode,
    };
    let dev = RaidDevice::activate(&params, provider.as_ref())?;
    let r = match cli.cmd {
        SubCommand::Info(info) => info.main(&dev),
        SubCommand::Map(map) => map.main(&dev),
        SubCommand::Read(read) => read.main(&dev).await,
        SubCommand::Write(write) => write.main(&dev).await,
    };
    dev.shutdown();
    r
}
