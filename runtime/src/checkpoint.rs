//! Checkpointing of kernel parameters.
//!
//! Kernels whose construction depends on stored parameters implement
//! [`Persistent`]. A saved kernel records its tag and version followed by its
//! own fields; [`RestoreRegistry`] maps the tag back to a constructor after
//! checking the stored version against the current one.

use std::collections::HashMap;
use std::fmt;

use snafu::{OptionExt, ensure};

use crate::circuit::RegisterId;
use crate::context::ConstructionContext;
use crate::error::{FieldKindSnafu, IncompatibleVersionSnafu, MissingFieldSnafu, Result, UnknownTagSnafu};

const TAG_FIELD: &str = "tag";
const MAJOR_FIELD: &str = "version.major";
const MINOR_FIELD: &str = "version.minor";

/// `(major, minor)` version of a kernel's stored parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("({major}, {minor})")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether parameters stored by `stored` can be read by this version.
    pub const fn accepts(&self, stored: Version) -> bool {
        self.major > stored.major || (self.major == stored.major && self.minor >= stored.minor)
    }

    pub fn check(&self, stored: Version, kernel: &str) -> Result<()> {
        ensure!(self.accepts(stored), IncompatibleVersionSnafu { kernel, version: *self, stored });
        Ok(())
    }
}

pub trait Saver {
    fn write_int(&mut self, name: &str, value: i64) -> Result<()>;
    fn write_string(&mut self, name: &str, value: &str) -> Result<()>;
    fn write_float_array(&mut self, name: &str, values: &[f32]) -> Result<()>;
}

pub trait Restorer {
    fn read_int(&self, name: &str) -> Result<i64>;
    fn read_string(&self, name: &str) -> Result<String>;
    fn read_float_array(&self, name: &str) -> Result<Vec<f32>>;
}

/// Kernel state that survives a checkpoint.
pub trait Persistent {
    /// Stable tag the restore registry dispatches on.
    fn tag(&self) -> &'static str;
    fn version(&self) -> Version;
    fn save(&self, saver: &mut dyn Saver) -> Result<()>;
}

/// Write `kernel`'s header and parameters.
pub fn save_persistent(kernel: &dyn Persistent, saver: &mut dyn Saver) -> Result<()> {
    let version = kernel.version();
    saver.write_string(TAG_FIELD, kernel.tag())?;
    saver.write_int(MAJOR_FIELD, version.major.into())?;
    saver.write_int(MINOR_FIELD, version.minor.into())?;
    kernel.save(saver)
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    String(String),
    FloatArray(Vec<f32>),
}

/// Checkpoint held in memory, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryCheckpoint {
    fields: HashMap<String, Value>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field(&self, name: &str) -> Result<&Value> {
        self.fields.get(name).context(MissingFieldSnafu { name })
    }
}

impl Saver for MemoryCheckpoint {
    fn write_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.fields.insert(name.to_string(), Value::Int(value));
        Ok(())
    }

    fn write_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.fields.insert(name.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    fn write_float_array(&mut self, name: &str, values: &[f32]) -> Result<()> {
        self.fields.insert(name.to_string(), Value::FloatArray(values.to_vec()));
        Ok(())
    }
}

impl Restorer for MemoryCheckpoint {
    fn read_int(&self, name: &str) -> Result<i64> {
        match self.field(name)? {
            Value::Int(value) => Ok(*value),
            _ => FieldKindSnafu { name, expected: "an integer" }.fail(),
        }
    }

    fn read_string(&self, name: &str) -> Result<String> {
        match self.field(name)? {
            Value::String(value) => Ok(value.clone()),
            _ => FieldKindSnafu { name, expected: "a string" }.fail(),
        }
    }

    fn read_float_array(&self, name: &str) -> Result<Vec<f32>> {
        match self.field(name)? {
            Value::FloatArray(values) => Ok(values.clone()),
            _ => FieldKindSnafu { name, expected: "a float array" }.fail(),
        }
    }
}

/// Rebuilds a kernel in `cx` from its stored fields, wired to `inputs`.
/// Returns the registers the restored kernel drives.
pub type RestoreFn = fn(&dyn Restorer, &mut ConstructionContext, &[RegisterId]) -> Result<Vec<RegisterId>>;

#[derive(Clone, Copy)]
struct RestoreEntry {
    version: Version,
    restore: RestoreFn,
}

/// Explicit mapping from stable tags to kernel constructors.
#[derive(Clone, Default)]
pub struct RestoreRegistry {
    entries: HashMap<&'static str, RestoreEntry>,
}

impl fmt::Debug for RestoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.entries.iter().map(|(tag, entry)| (*tag, entry.version)).collect();
        tags.sort();
        f.debug_struct("RestoreRegistry").field("entries", &tags).finish()
    }
}

impl RestoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing the kernels this crate persists.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::kernel::CONSTANT_TAG, crate::kernel::CONSTANT_VERSION, crate::kernel::restore_constant);
        registry.register(crate::kernel::DEVICE_TAG, crate::kernel::DEVICE_VERSION, crate::kernel::restore_device);
        registry
    }

    /// Register `restore` for `tag`; a later registration replaces an earlier one.
    pub fn register(&mut self, tag: &'static str, version: Version, restore: RestoreFn) {
        self.entries.insert(tag, RestoreEntry { version, restore });
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Restore the kernel stored in `restorer` into `cx`.
    pub fn restore(
        &self,
        restorer: &dyn Restorer,
        cx: &mut ConstructionContext,
        inputs: &[RegisterId],
    ) -> Result<Vec<RegisterId>> {
        let tag = restorer.read_string(TAG_FIELD)?;
        let entry = self.entries.get(tag.as_str()).context(UnknownTagSnafu { tag: tag.clone() })?;
        let stored = Version::new(read_u32(restorer, MAJOR_FIELD)?, read_u32(restorer, MINOR_FIELD)?);
        entry.version.check(stored, &tag)?;
        (entry.restore)(restorer, cx, inputs)
    }
}

fn read_u32(restorer: &dyn Restorer, name: &str) -> Result<u32> {
    u32::try_from(restorer.read_int(name)?).ok().context(FieldKindSnafu { name, expected: "a version number" })
}
