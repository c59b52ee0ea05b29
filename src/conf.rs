//! Process-wide evaluation settings.
//!
//! Two layers: a documented, persisted [`ConfigStore`] (property name,
//! default, description, category — loaded from and saved to
//! `~/.ivy/conf.txt`), and a small [`Config`] struct cloned onto the hot
//! evaluation path so that no primitive pays a `HashMap` lookup per call.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use rand_pcg::Pcg64;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Numeric,
    Display,
    Resource,
    Debug,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Numeric => "numeric",
            Category::Display => "display",
            Category::Resource => "resource",
            Category::Debug => "debug",
        };
        write!(f, "{}", s)
    }
}

pub struct PropDef {
    pub name: &'static str,
    pub default: &'static str,
    pub description: &'static str,
    pub category: Category,
}

/// Every `)`-settable property. Order matches the `)save` config-command
/// block (ibase/obase first, since number lexing depends on them).
pub static ALL_PROPS: &[PropDef] = &[
    // ── Numeric ──────────────────────────────────────────────────────────
    PropDef { name: "ibase", default: "10", description: "input number base (2..36, or 0 for C-style prefixes)", category: Category::Numeric },
    PropDef { name: "obase", default: "10", description: "output number base (2..36, or 0 for C-style prefixes)", category: Category::Numeric },
    PropDef { name: "origin", default: "1", description: "index of the first element of a vector (0 or 1)", category: Category::Numeric },
    PropDef { name: "prec", default: "256", description: "BigFloat mantissa precision in bits", category: Category::Numeric },
    PropDef { name: "seed", default: "0", description: "random generator seed", category: Category::Numeric },
    // ── Resource ─────────────────────────────────────────────────────────
    PropDef { name: "maxbits", default: "1000000", description: "maximum bit width of an integer result before overflow error", category: Category::Resource },
    PropDef { name: "maxdigits", default: "1000000", description: "maximum decimal digit count before floating-format printing", category: Category::Resource },
    PropDef { name: "maxstack", default: "100000", description: "maximum call-frame depth before stack-overflow error", category: Category::Resource },
    // ── Display ──────────────────────────────────────────────────────────
    PropDef { name: "format", default: "", description: "printf-style number format overriding base-driven printing", category: Category::Display },
    PropDef { name: "prompt", default: "", description: "REPL prompt string", category: Category::Display },
    // ── Debug ────────────────────────────────────────────────────────────
    PropDef { name: "debug", default: "", description: "comma list of debug trace flags (e.g. 'types')", category: Category::Debug },
];

fn prop(name: &str) -> Option<&'static PropDef> {
    ALL_PROPS.iter().find(|p| p.name == name)
}

/// Persisted, name-keyed settings store — the `)conf` surface.
pub struct ConfigStore {
    values: HashMap<String, String>,
}

impl ConfigStore {
    pub fn load() -> Self {
        let mut values: HashMap<String, String> = ALL_PROPS
            .iter()
            .map(|p| (p.name.to_string(), p.default.to_string()))
            .collect();

        if let Some(path) = Self::config_path() {
            if let Ok(text) = std::fs::read_to_string(&path) {
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        values.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        ConfigStore { values }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".ivy").join("conf.txt"))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), String> {
        if prop(key).is_none() {
            return Err(format!("unknown property '{}'", key));
        }
        self.values.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn reset(&mut self) {
        for p in ALL_PROPS {
            self.values.insert(p.name.to_string(), p.default.to_string());
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut text = String::new();
        for p in ALL_PROPS {
            let v = self.values.get(p.name).map(String::as_str).unwrap_or(p.default);
            text.push_str(&format!("{}={}\n", p.name, v));
        }
        std::fs::write(path, text)
    }

    pub fn list(&self) -> Vec<(&'static str, String, Category)> {
        ALL_PROPS
            .iter()
            .map(|p| {
                let v = self.values.get(p.name).cloned().unwrap_or_else(|| p.default.to_string());
                (p.name, v, p.category)
            })
            .collect()
    }

    pub fn describe(&self, key: &str) -> Option<String> {
        prop(key).map(|p| format!("{} [{}]: {}", p.name, p.category, p.description))
    }

    /// Materialize the hot-path [`Config`] from the current stored values.
    pub fn to_config(&self) -> Config {
        Config {
            ibase: self.get_u32("ibase").unwrap_or(10),
            obase: self.get_u32("obase").unwrap_or(10),
            origin: self.get_u32("origin").unwrap_or(1),
            float_prec: self.get_u32("prec").unwrap_or(256),
            maxbits: self.get_u32("maxbits").unwrap_or(1_000_000) as u64,
            maxdigits: self.get_u32("maxdigits").unwrap_or(1_000_000) as u64,
            maxstack: self.get_u32("maxstack").unwrap_or(100_000) as usize,
            format: self.get("format").unwrap_or("").to_string(),
            prompt: self.get("prompt").unwrap_or("").to_string(),
            debug: self
                .get("debug")
                .unwrap_or("")
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::load()
    }
}

/// The hot-path evaluation config, consulted by every primitive.
#[derive(Debug, Clone)]
pub struct Config {
    pub ibase: u32,
    pub obase: u32,
    pub origin: u32,
    pub float_prec: u32,
    pub maxbits: u64,
    pub maxdigits: u64,
    pub maxstack: usize,
    pub format: String,
    pub prompt: String,
    pub debug: Vec<String>,
}

impl Config {
    /// `format` with `/` spliced between numerator and denominator, used to
    /// print BigRat values (derived automatically, per the value-printing
    /// rules).
    pub fn rat_format(&self) -> String {
        if self.format.is_empty() {
            String::new()
        } else {
            format!("{}/{}", self.format, self.format)
        }
    }

    pub fn debug_enabled(&self, flag: &str) -> bool {
        self.debug.iter().any(|f| f == flag)
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigStore::load().to_config()
    }
}

/// The process-wide random generator, seeded via `)seed`. Lives in Config's
/// owning Context rather than in `Config` itself (Config is cloned cheaply
/// and often; the RNG state must not be).
pub struct RandomState {
    pub rng: Pcg64,
    pub seed: u64,
}

impl RandomState {
    pub fn new(seed: u64) -> Self {
        RandomState { rng: Pcg64::seed_from_u64(seed), seed }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = Pcg64::seed_from_u64(seed);
    }
}

impl Default for RandomState {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let store = ConfigStore { values: HashMap::new() };
        let cfg = store.to_config();
        assert_eq!(cfg.ibase, 10);
        assert_eq!(cfg.origin, 1);
    }

    #[test]
    fn unknown_property_rejected() {
        let mut store = ConfigStore::load();
        assert!(store.set("bogus", "1").is_err());
    }

    #[test]
    fn set_known_property() {
        let mut store = ConfigStore::load();
        store.set("ibase", "16").unwrap();
        assert_eq!(store.get("ibase"), Some("16"));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut store = ConfigStore::load();
        store.set("ibase", "16").unwrap();
        store.reset();
        assert_eq!(store.get("ibase"), Some("10"));
    }
}
