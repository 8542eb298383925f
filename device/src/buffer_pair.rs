//! Master/slave buffer pair backing one field register.
//!
//! The master buffer lives in accelerator memory, the slave buffer in host
//! memory. [`Validity`] records which copies hold the current contents; there is
//! no state in which neither side is valid.
//!
//! ```text
//!        write(Host)                    write(Accelerator)
//!   ┌──────────────► HostValid ◄──┐  ┌──► AcceleratorValid ◄─────────┐
//!   │                  │ read(Accelerator)  │ read(Host)             │
//!   │                  ▼   (upload)   │  │   (download)   ▼          │
//!   └────────────── BothValid ────────┘  └────────────── BothValid ──┘
//! ```

use std::sync::Arc;

use tracing::trace;
use weft_dtype::{ElementKind, FieldType};

use crate::allocator::{Allocator, MemorySide};
use crate::buffer::{Buffer, Encoding};
use crate::error::Result;

/// Which copies of a field register's contents are current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    HostValid,
    AcceleratorValid,
    BothValid,
}

impl Validity {
    pub const fn is_valid(&self, side: MemorySide) -> bool {
        matches!(
            (self, side),
            (Self::BothValid, _) | (Self::HostValid, MemorySide::Host) | (Self::AcceleratorValid, MemorySide::Accelerator)
        )
    }

    /// State after writing `side`: only the written copy is current.
    pub const fn written(side: MemorySide) -> Self {
        match side {
            MemorySide::Host => Self::HostValid,
            MemorySide::Accelerator => Self::AcceleratorValid,
        }
    }
}

/// Number of transfers performed in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub uploads: u64,
    pub downloads: u64,
}

/// Accelerator-resident master buffer and host-resident slave buffer of one field.
#[derive(Debug)]
pub struct FieldBuffer {
    field_type: FieldType,
    master: Buffer,
    slave: Buffer,
    validity: Validity,
    stats: TransferStats,
}

impl FieldBuffer {
    /// Allocate both sides, zero-initialised and therefore both valid.
    pub fn new(field_type: FieldType, host: Arc<dyn Allocator>, accelerator: Arc<dyn Allocator>) -> Result<Self> {
        let layout = field_type.layout();
        let encoding = match field_type.element() {
            ElementKind::Pixel => Encoding::U8Normalized,
            ElementKind::Float | ElementKind::Complex => Encoding::F32,
        };
        let master = Buffer::allocate(accelerator, layout.words(), Encoding::F32)?;
        let slave = Buffer::allocate(host, layout.words(), encoding)?;
        Ok(Self { field_type, master, slave, validity: Validity::BothValid, stats: TransferStats::default() })
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn is_valid(&self, side: MemorySide) -> bool {
        self.validity.is_valid(side)
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Number of scalar words on either side.
    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    /// Make `side` current, transferring from the other side when it is stale.
    pub fn sync(&mut self, side: MemorySide) -> Result<()> {
        if self.validity.is_valid(side) {
            return Ok(());
        }
        match side {
            MemorySide::Accelerator => {
                self.master.copy_from(&self.slave)?;
                self.stats.uploads += 1;
            }
            MemorySide::Host => {
                self.master.synchronize()?;
                self.slave.copy_from(&self.master)?;
                self.stats.downloads += 1;
            }
        }
        trace!(field = %self.field_type, ?side, "field buffer synchronized");
        self.validity = Validity::BothValid;
        Ok(())
    }

    /// Buffer on `side` for reading, transferring first if that side is stale.
    pub fn read(&mut self, side: MemorySide) -> Result<&Buffer> {
        self.sync(side)?;
        Ok(self.side(side))
    }

    /// Buffer on `side` for writing; the opposite side becomes stale.
    pub fn write(&mut self, side: MemorySide) -> &mut Buffer {
        self.validity = Validity::written(side);
        match side {
            MemorySide::Accelerator => &mut self.master,
            MemorySide::Host => &mut self.slave,
        }
    }

    /// Buffer on `side` without synchronizing; callers must check validity.
    pub fn side(&self, side: MemorySide) -> &Buffer {
        match side {
            MemorySide::Accelerator => &self.master,
            MemorySide::Host => &self.slave,
        }
    }

    pub fn master(&self) -> &Buffer {
        &self.master
    }

    pub fn slave(&self) -> &Buffer {
        &self.slave
    }

    /// Read the current contents on the host side.
    pub fn read_host(&mut self) -> Result<Vec<f32>> {
        self.read(MemorySide::Host)?.read_f32()
    }

    /// Overwrite the contents from the host side.
    pub fn write_host(&mut self, values: &[f32]) -> Result<()> {
        let slave = &mut self.slave;
        slave.write_f32(values)?;
        self.validity = Validity::HostValid;
        Ok(())
    }

    /// Overwrite the master side with `source`'s current accelerator contents.
    pub fn latch_from(&mut self, source: &mut FieldBuffer) -> Result<()> {
        source.sync(MemorySide::Accelerator)?;
        self.master.copy_from(&source.master)?;
        self.validity = Validity::AcceleratorValid;
        Ok(())
    }
}
