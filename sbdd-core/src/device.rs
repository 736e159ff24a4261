// vim: tw=80
//! The striped block device

use nix::errno::Errno;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    bio::{Bio, BioFut},
    config::{DispatchMode, Params, RaidType, StripeConfig},
    disk::{self, DeviceProvider, DiskSet},
    dispatch::{Dispatch, Engine, EngineState},
    raid0::Raid0,
    types::*,
};

/// Legacy CHS geometry, for callers that still ask for it
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Geometry {
    pub heads: u8,
    pub sectors: u8,
    pub cylinders: u16,
    pub start: u64,
}

impl Geometry {
    const SECTORS_PER_TRACK: SectorT = 63;
    const MAX_HEADS: SectorT = 255;

    /// Make up a geometry for a device of `capacity` sectors.
    ///
    /// Cylinder counts too large to represent are saturated.
    pub fn from_capacity(capacity: SectorT) -> Self {
        if capacity <= Self::SECTORS_PER_TRACK {
            return Geometry {
                heads: 1,
                sectors: capacity as u8,
                cylinders: 1,
                start: 0
            };
        }
        let tracks = capacity.div_ceil(Self::SECTORS_PER_TRACK);
        let (heads, cylinders) = if tracks > Self::MAX_HEADS {
            (Self::MAX_HEADS, tracks.div_ceil(Self::MAX_HEADS))
        } else {
            (tracks, 1)
        };
        Geometry {
            heads: heads as u8,
            sectors: Self::SECTORS_PER_TRACK as u8,
            cylinders: u16::try_from(cylinders).unwrap_or(u16::MAX),
            start: 0
        }
    }
}

/// Return value of [`RaidDevice::status`]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Status {
    pub uuid: Uuid,
    pub raid_type: RaidType,
    pub mode: DispatchMode,
    pub state: EngineState,
    pub stripe_unit: SectorT,
    pub chunk_sectors: SectorT,
    pub capacity: SectorT,
    pub max_transfer: SectorT,
    pub geometry: Geometry,
    pub disks: Vec<disk::Status>,
}

/// A RAID-0 device striped across several member disks.
///
/// Constructed by [`activate`](Self::activate), torn down by
/// [`shutdown`](Self::shutdown) or by dropping it.
pub struct RaidDevice {
    uuid: Uuid,
    config: StripeConfig,
    raid: Arc<Raid0>,
    engine: Engine,
}

impl RaidDevice {
    /// Usable size in sectors
    pub fn capacity(&self) -> SectorT {
        self.raid.capacity()
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Bring up a device.
    ///
    /// Validates the parameters, opens every member disk, and starts the
    /// dispatch engine.  On failure, nothing is left open.
    #[tracing::instrument(skip(provider))]
    pub fn activate(params: &Params, provider: &dyn DeviceProvider)
        -> Result<Self>
    {
        let raid_type = RaidType::try_from(params.raid_type)
            .inspect_err(|e| error!(error = %e, "wrong raid type"))?;
        let config = params.raid_config.parse::<StripeConfig>()
            .inspect_err(|e| error!(error = %e, "invalid raid config"))?;
        let disks = DiskSet::open(&config, provider)?;
        let raid = Arc::new(Raid0::new(&config, disks));
        let engine = Engine::new(params.mode, raid.clone());
        engine.start()
            .inspect_err(|e| error!(error = %e, "cannot start dispatch"))?;
        let uuid = Uuid::new_v4();
        info!(%uuid, ?raid_type, mode = %params.mode,
              capacity = raid.capacity(), max_transfer = raid.max_transfer(),
              "created striped device");
        Ok(RaidDevice{uuid, config, raid, engine})
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::from_capacity(self.capacity())
    }

    /// Largest request accepted, in sectors
    pub fn max_transfer(&self) -> SectorT {
        self.raid.max_transfer()
    }

    /// Read into `buf`, starting at `sector`
    pub fn read_at(&self, buf: IoVecMut, sector: SectorT) -> BioFut {
        let (bio, fut) = Bio::read(buf, sector);
        self.submit(bio);
        fut
    }

    /// Stop accepting requests, wait for everything in flight, and release
    /// the member disks.  Idempotent.
    pub fn shutdown(&self) {
        if self.engine.state() != EngineState::Stopped {
            info!(uuid = %self.uuid, "shutting down striped device");
        }
        self.engine.stop();
        self.raid.disks().close();
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn status(&self) -> Status {
        Status {
            uuid: self.uuid,
            raid_type: RaidType::Raid0,
            mode: self.engine.mode(),
            state: self.state(),
            stripe_unit: self.config.stripe_unit(),
            chunk_sectors: self.config.chunk_sectors(),
            capacity: self.capacity(),
            max_transfer: self.max_transfer(),
            geometry: self.geometry(),
            disks: self.raid.disks().status(),
        }
    }

    /// Submit a request.  Its outcome is reported through its completion.
    ///
    /// Requests must lie within the device, must be a whole number of
    /// sectors, and must be no larger than [`max_transfer`](Self::max_transfer).
    pub fn submit(&self, bio: Bio) {
        if !bio.is_aligned() {
            debug!(?bio, "rejecting request: not a whole number of sectors");
            bio.fail(Errno::EINVAL);
            return;
        }
        if bio.sectors() > self.max_transfer() {
            debug!(?bio, max = self.max_transfer(), "rejecting request: too big");
            bio.fail(Errno::EINVAL);
            return;
        }
        let end = bio.sector().checked_add(bio.sectors());
        if end.map_or(true, |end| end > self.capacity()) {
            debug!(?bio, capacity = self.capacity(),
                   "rejecting request: past the end of the device");
            bio.fail(Errno::EIO);
            return;
        }
        self.engine.submit(bio);
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Write `buf`, starting at `sector`
    pub fn write_at(&self, buf: IoVec, sector: SectorT) -> BioFut {
        let (bio, fut) = Bio::write(buf, sector);
        self.submit(bio);
        fut
    }
}

impl Drop for RaidDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}
