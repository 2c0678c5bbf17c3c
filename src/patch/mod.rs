//! The structured patch: instruments made of units, the form a patch is
//! edited and stored in.
//!
//! Units reference each other only through integer ids (`send` stores its
//! target id as the `target` parameter), so a patch can be copied, pasted and
//! serialized freely. [`IdAllocator`] keeps ids unique on insert.

mod ids;
mod warnings;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::catalogue::{StackUse, UnitKind};

pub use ids::IdAllocator;
pub use warnings::PatchWarning;

#[cfg(feature = "serde")]
fn is_zero(v: &i32) -> bool {
    *v == 0
}

#[cfg(feature = "serde")]
fn is_false(v: &bool) -> bool {
    !*v
}

/// Named integer parameters of a unit. Missing names read as 0.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "BTreeMap<String, i32>"))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap(BTreeMap<String, i32>);

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> i32 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: i32) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<i32> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, i32>> for ParamMap {
    /// Older songs stored inverted filter outputs as separate
    /// `negbandpass` / `neghighpass` flags; they now live in the sign of
    /// `bandpass` / `highpass`.
    fn from(mut map: BTreeMap<String, i32>) -> Self {
        for (legacy, current) in [("negbandpass", "bandpass"), ("neghighpass", "highpass")] {
            if let Some(n) = map.remove(legacy) {
                let v = map.get(current).copied().unwrap_or(0);
                map.insert(current.to_string(), v - n);
            }
        }
        ParamMap(map)
    }
}

impl<'a> FromIterator<(&'a str, i32)> for ParamMap {
    fn from_iter<T: IntoIterator<Item = (&'a str, i32)>>(iter: T) -> Self {
        ParamMap(iter.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "StoredUnit"))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unit {
    /// Catalogue name; an empty type is a placeholder that produces no code.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "type", skip_serializing_if = "String::is_empty")
    )]
    pub unit_type: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "is_zero"))]
    pub id: i32,
    pub parameters: ParamMap,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "varargs", skip_serializing_if = "Vec::is_empty")
    )]
    pub var_args: Vec<i32>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "is_false"))]
    pub disabled: bool,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "String::is_empty"))]
    pub comment: String,
}

/// A unit as written in a song file, before missing parameters are filled.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct StoredUnit {
    #[serde(rename = "type", alias = "Type", default)]
    unit_type: String,
    #[serde(alias = "ID", default)]
    id: i32,
    #[serde(alias = "Parameters", default)]
    parameters: ParamMap,
    #[serde(rename = "varargs", alias = "VarArgs", default)]
    var_args: Vec<i32>,
    #[serde(alias = "Disabled", default)]
    disabled: bool,
    #[serde(alias = "Comment", default)]
    comment: String,
}

#[cfg(feature = "serde")]
impl From<StoredUnit> for Unit {
    fn from(stored: StoredUnit) -> Self {
        let mut unit = Unit {
            unit_type: stored.unit_type,
            id: stored.id,
            parameters: stored.parameters,
            var_args: stored.var_args,
            disabled: stored.disabled,
            comment: stored.comment,
        };
        unit.fill_missing_parameters();
        unit
    }
}

impl Unit {
    /// A unit of `kind` with the catalogue's default parameters.
    pub fn new(kind: UnitKind) -> Self {
        Self {
            unit_type: kind.name().to_string(),
            parameters: kind.default_parameters().iter().copied().collect(),
            var_args: kind.default_var_args().to_vec(),
            ..Self::default()
        }
    }

    /// Gives every catalogue parameter the unit lacks its default value.
    /// A missing `notetracking` means the delay predates note tracking and
    /// stays 0.
    pub fn fill_missing_parameters(&mut self) {
        let Some(kind) = self.kind() else {
            return;
        };
        for &(name, value) in kind.default_parameters() {
            if !self.parameters.contains(name) {
                let value = if name == "notetracking" { 0 } else { value };
                self.parameters.set(name, value);
            }
        }
    }

    pub fn with_param(mut self, name: &str, value: i32) -> Self {
        self.parameters.set(name, value);
        self
    }

    pub fn with_id(mut self, id: i32) -> Self {
        self.id = id;
        self
    }

    pub fn with_var_args(mut self, var_args: impl Into<Vec<i32>>) -> Self {
        self.var_args = var_args.into();
        self
    }

    pub fn kind(&self) -> Option<UnitKind> {
        UnitKind::from_name(&self.unit_type)
    }

    pub fn param(&self, name: &str) -> i32 {
        self.parameters.get(name)
    }

    pub fn is_stereo(&self) -> bool {
        self.param("stereo") == 1
    }

    /// Whether the unit produces any code at all.
    pub fn is_active(&self) -> bool {
        !self.disabled && !self.unit_type.is_empty()
    }

    /// Stack effect of the unit; inactive and unknown units have none.
    pub fn stack_use(&self) -> StackUse {
        match self.kind() {
            Some(kind) if !self.disabled => {
                kind.stack_use(self.is_stereo(), self.param("sendpop") == 1)
            }
            _ => StackUse::default(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    #[cfg_attr(
        feature = "serde",
        serde(alias = "Name", default, skip_serializing_if = "String::is_empty")
    )]
    pub name: String,
    #[cfg_attr(
        feature = "serde",
        serde(alias = "Comment", default, skip_serializing_if = "String::is_empty")
    )]
    pub comment: String,
    #[cfg_attr(feature = "serde", serde(rename = "numvoices", alias = "NumVoices"))]
    pub num_voices: usize,
    #[cfg_attr(feature = "serde", serde(alias = "Units", default))]
    pub units: Vec<Unit>,
    /// Only honoured by the interactive player.
    #[cfg_attr(
        feature = "serde",
        serde(alias = "Mute", default, skip_serializing_if = "is_false")
    )]
    pub mute: bool,
    /// Bitmask of worker threads allowed to render this instrument, minus one.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "threadmaskm1", alias = "ThreadMaskM1", default, skip_serializing_if = "is_zero")
    )]
    pub thread_mask_m1: i32,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: String::new(),
            comment: String::new(),
            num_voices: 1,
            units: Vec::new(),
            mute: false,
            thread_mask_m1: 0,
        }
    }
}

impl Instrument {
    pub fn new(name: impl Into<String>, num_voices: usize, units: Vec<Unit>) -> Self {
        Self {
            name: name.into(),
            num_voices,
            units,
            ..Self::default()
        }
    }

    pub fn thread_mask(&self) -> u32 {
        (self.thread_mask_m1 + 1).max(1) as u32
    }
}

/// An ordered list of instruments. Voices are numbered consecutively
/// through the instruments.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch(pub Vec<Instrument>);

impl Deref for Patch {
    type Target = Vec<Instrument>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Patch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Instrument>> for Patch {
    fn from(instruments: Vec<Instrument>) -> Self {
        Patch(instruments)
    }
}

impl Patch {
    /// Total voices used, summed over every instrument.
    pub fn num_voices(&self) -> usize {
        self.iter().map(|i| i.num_voices).sum()
    }

    /// Delay lines a synth needs for this patch. Each voice of a delay unit
    /// gets one line per delay time; a stereo unit splits its delay times
    /// between the two channels.
    pub fn num_delay_lines(&self) -> usize {
        self.iter()
            .map(|instr| {
                let per_voice: usize = instr
                    .units
                    .iter()
                    .filter(|u| u.is_active() && u.kind() == Some(UnitKind::Delay))
                    .map(delay_lines_of)
                    .sum();
                per_voice * instr.num_voices
            })
            .sum()
    }

    /// Sync outputs produced each sample, one per voice of every sync unit.
    pub fn num_syncs(&self) -> usize {
        self.iter()
            .map(|instr| {
                instr
                    .units
                    .iter()
                    .filter(|u| u.is_active() && u.kind() == Some(UnitKind::Sync))
                    .count()
                    * instr.num_voices
            })
            .sum()
    }

    pub fn num_threads(&self) -> usize {
        self.iter()
            .map(|i| (32 - i.thread_mask().leading_zeros()) as usize)
            .max()
            .unwrap_or(1)
            .max(1)
    }

    /// Index of the first voice of an instrument; the cumulative voice count.
    pub fn first_voice_for_instrument(&self, instrument: usize) -> usize {
        self.iter().take(instrument).map(|i| i.num_voices).sum()
    }

    pub fn instrument_for_voice(&self, voice: usize) -> Option<usize> {
        let mut remaining = voice;
        for (index, instr) in self.iter().enumerate() {
            if remaining < instr.num_voices {
                return Some(index);
            }
            remaining -= instr.num_voices;
        }
        None
    }

    /// Finds `(instrument, unit)` of the first enabled unit with `id`.
    /// Id 0 means "no id" and is never found.
    pub fn find_unit(&self, id: i32) -> Option<(usize, usize)> {
        if id == 0 {
            return None;
        }
        self.iter().enumerate().find_map(|(i, instr)| {
            instr
                .units
                .iter()
                .position(|u| u.id == id && !u.disabled)
                .map(|u| (i, u))
        })
    }

    pub fn max_id(&self) -> i32 {
        self.units().map(|u| u.id).max().unwrap_or(0)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.iter().flat_map(|i| i.units.iter())
    }

    /// First id that is used by more than one unit.
    pub fn duplicate_id(&self) -> Option<i32> {
        let mut seen = std::collections::BTreeSet::new();
        self.units()
            .map(|u| u.id)
            .filter(|&id| id != 0)
            .find(|&id| !seen.insert(id))
    }

    /// Gives every unit an id that is unique in the patch, keeping the
    /// first occurrence of each existing id. Units targeted by a `send`
    /// keep their id, so references stay valid.
    pub fn fix_ids(&mut self) {
        let mut ids = IdAllocator::default();
        for instr in self.iter_mut() {
            for unit in &mut instr.units {
                if unit.id == 0 || !ids.claim(unit.id) {
                    unit.id = 0;
                }
            }
        }
        for instr in self.iter_mut() {
            for unit in instr.units.iter_mut().filter(|u| u.id == 0) {
                unit.id = ids.next_id();
            }
        }
    }
}

pub(crate) fn delay_lines_of(unit: &Unit) -> usize {
    let len = unit.var_args.len();
    if unit.is_stereo() {
        len / 2 * 2
    } else {
        len
    }
}
