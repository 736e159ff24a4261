// vim: tw=80
//! Activation parameters and the RAID-0 configuration string

use serde_derive::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use tracing::{debug, info};

use crate::types::*;

/// Maximum number of member disks in one striped device
pub const MAX_DISKS: usize = 32;

/// RAID layout selected at activation time.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RaidType {
    /// Plain striping, no redundancy
    Raid0,
}

impl TryFrom<u64> for RaidType {
    type Error = Error;

    fn try_from(raid_type: u64) -> Result<Self> {
        match raid_type {
            0 => Ok(RaidType::Raid0),
            n => Err(Error::Unsupported(format!("raid type {n}")))
        }
    }
}

/// How requests get from the submission boundary to the member disks
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum DispatchMode {
    /// Process every request synchronously in the submitter's context
    #[default]
    Inline,
    /// Queue requests for a single worker thread
    Queued,
}

impl FromStr for DispatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inline" => Ok(DispatchMode::Inline),
            "queued" => Ok(DispatchMode::Queued),
            _ => Err(Error::InvalidArgument(format!("unknown mode '{s}'")))
        }
    }
}

impl Display for DispatchMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Inline => "inline".fmt(f),
            DispatchMode::Queued => "queued".fmt(f),
        }
    }
}

/// Everything needed to activate a device.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Params {
    /// Raw RAID level selector.  Only 0 is supported.
    pub raid_type: u64,
    /// Configuration string, like `stripe=4;disks=/dev/a,/dev/b`
    pub raid_config: String,
    pub mode: DispatchMode,
}

/// Layout of a striped device.
///
/// Immutable once parsed.  The order of `disks` defines each disk's index for
/// the sector mapping, so it must never be changed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StripeConfig {
    /// Stripe unit, in the configuration's own units.  See
    /// [`chunk_sectors`](Self::chunk_sectors).
    stripe_unit: SectorT,
    disks: Vec<String>,
}

impl StripeConfig {
    /// Number of consecutive sectors placed on one disk before moving to the
    /// next.
    ///
    /// The configured stripe unit is doubled.  Existing configurations depend
    /// on that convention.
    pub fn chunk_sectors(&self) -> SectorT {
        self.stripe_unit << 1
    }

    pub fn disks(&self) -> &[String] {
        &self.disks[..]
    }

    pub fn ndisks(&self) -> usize {
        self.disks.len()
    }

    /// Build a configuration directly, applying the same validation as the
    /// parser.
    pub fn new<I, S>(stripe_unit: SectorT, disks: I) -> Result<Self>
        where I: IntoIterator<Item=S>,
              S: Into<String>
    {
        let disks = disks.into_iter().map(Into::into).collect::<Vec<_>>();
        if stripe_unit == 0 {
            return Err(Error::InvalidArgument("zero stripe size".into()));
        }
        // A full stripe of the widest device must still be addressable
        let fits = stripe_unit.checked_mul(2)
            .and_then(|chunk| chunk.checked_mul(MAX_DISKS as SectorT))
            .is_some();
        if !fits {
            return Err(Error::InvalidArgument(
                format!("stripe size {stripe_unit} is too large")));
        }
        if disks.is_empty() {
            return Err(Error::InvalidArgument("no disks".into()));
        }
        if disks.iter().any(String::is_empty) {
            return Err(Error::InvalidArgument("empty disk name".into()));
        }
        if disks.len() > MAX_DISKS {
            return Err(Error::CapacityExceeded {
                count: disks.len(),
                max: MAX_DISKS
            });
        }
        Ok(StripeConfig{stripe_unit, disks})
    }

    pub fn stripe_unit(&self) -> SectorT {
        self.stripe_unit
    }
}

impl Display for StripeConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "stripe={};disks={}", self.stripe_unit, self.disks.join(","))
    }
}

impl FromStr for StripeConfig {
    type Err = Error;

    /// Parse a string of `;`-separated `key=value` options.
    ///
    /// Recognized keys are `stripe` and `disks`.  Others are ignored.
    fn from_str(cfg: &str) -> Result<Self> {
        info!(cfg, "parsing raid_0 config");
        let mut stripe = None;
        let mut disks = None;
        for token in cfg.split(';').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            match key.trim() {
                "stripe" => {
                    let v = value.trim().parse::<SectorT>()
                        .map_err(|_| Error::InvalidArgument(
                            format!("bad option arg (not int) at '{token}'")
                        ))?;
                    stripe = Some(v);
                }
                "disks" => {
                    let v = value.split(',')
                        .map(str::trim)
                        .map(str::to_owned)
                        .collect::<Vec<_>>();
                    disks = Some(v);
                }
                other => debug!(key = other, "ignoring unknown option"),
            }
        }
        let stripe = stripe.ok_or_else(||
            Error::InvalidArgument("missing stripe size".into()))?;
        let disks = disks.filter(|d| d.iter().any(|s| !s.is_empty()))
            .ok_or_else(|| Error::InvalidArgument("no disks".into()))?;
        let config = StripeConfig::new(stripe, disks)?;
        info!(ndisks = config.ndisks(), stripe = config.stripe_unit,
              "parsed raid_0 config");
        Ok(config)
    }
}
