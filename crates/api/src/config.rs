//! Types for use when configuring block retrieval modules.

use crate::*;
use std::sync::Mutex;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> BrResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| BrError::other_src("encode", e))?,
    )
    .map_err(|e| BrError::other_src("decode", e))
}

/// Denotes a type used to configure a specific module.
///
/// A module config is a struct with a single camelCase field named after
/// the module, e.g. `{ "coreBlockRetrieval": { "workerCount": 10 } }`.
/// All module configs are merged into the top level of one [Config] object,
/// so two modules must never share a top-level key.
///
/// Note, the types defined here are for configuration that cannot be
/// changed at runtime, the likes of which might be found in a
/// configuration file.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

impl<T> ModConfig for T where
    T: 'static
        + Sized
        + Default
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned
        + Send
        + Sync
{
}

/// Block retrieval configuration.
#[derive(Debug, Default)]
pub struct Config(Mutex<serde_json::Map<String, serde_json::Value>>);

impl serde::Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0
            .lock()
            .map_err(|_| serde::ser::Error::custom("config mutex poisoned"))?
            .serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = serde_json::Map::deserialize(deserializer)?;
        Ok(Self(Mutex::new(map)))
    }
}

impl Config {
    /// Merge the top-level properties of a module config into this config.
    ///
    /// Module factories call this from `default_config` to register their
    /// defaults. Callers may also call it to override a module config
    /// before the module is constructed.
    pub fn set_module_config<M: ModConfig>(&self, m: &M) -> BrResult<()> {
        let value: serde_json::Value = tc(m)?;
        let serde_json::Value::Object(map) = value else {
            return Err(BrError::other(
                "module config must serialize to an object",
            ));
        };
        let mut lock = self
            .0
            .lock()
            .map_err(|_| BrError::other("config mutex poisoned"))?;
        for (k, v) in map {
            lock.insert(k, v);
        }
        Ok(())
    }

    /// Extract a module config. Properties missing from this config are
    /// filled from the module's serde defaults, extraneous properties
    /// are ignored.
    pub fn get_module_config<M: ModConfig>(&self) -> BrResult<M> {
        let lock = self
            .0
            .lock()
            .map_err(|_| BrError::other("config mutex poisoned"))?;
        tc(&*lock)
    }
}
