//! Characteristic taxonomy for discovery and output ordering.
//!
//! The taxonomy is the ordered catalogue of stock-level characteristics the
//! pipeline normalizes and sorts portfolios on. Each entry carries the stable
//! identifier it has in the originating research catalogue and the frequency
//! at which its underlying data refreshes.

use crate::{PanelError, Result};
use derive_more::Display;
use std::collections::HashMap;

/// Refresh frequency group of a characteristic.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CharacteristicGroup {
    /// Annual - balance sheet and income statement items
    Annual,
    /// Quarterly - quarterly filing items
    Quarterly,
    /// Monthly - price and trading based items
    Monthly,
}

/// Metadata for a single characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    /// Column name in the characteristic panel
    pub name: String,
    /// Identifier in the originating research catalogue
    pub id: u16,
    /// Refresh group
    pub group: CharacteristicGroup,
}

impl Characteristic {
    /// Create a new characteristic entry.
    pub fn new(name: impl Into<String>, id: u16, group: CharacteristicGroup) -> Self {
        Self {
            name: name.into(),
            id,
            group,
        }
    }
}

const ANNUAL: &[(&str, u16)] = &[
    ("absacc", 1),
    ("acc", 2),
    ("age", 4),
    ("agr", 5),
    ("bm", 9),
    ("bm_ia", 10),
    ("cashdebt", 12),
    ("cashpr", 13),
    ("cfp", 14),
    ("cfp_ia", 15),
    ("chatoia", 16),
    ("chcsho", 17),
    ("chempia", 18),
    ("chinv", 19),
    ("chpmia", 21),
    ("convind", 24),
    ("currat", 25),
    ("depr", 26),
    ("divi", 27),
    ("divo", 28),
    ("dy", 30),
    ("egr", 32),
    ("ep", 33),
    ("gma", 34),
    ("grcapx", 35),
    ("grltnoa", 36),
    ("herf", 37),
    ("hire", 38),
    ("invest", 42),
    ("lev", 43),
    ("lgr", 44),
    ("mve_ia", 52),
    ("operprof", 54),
    ("orgcap", 55),
    ("pchcapx_ia", 56),
    ("pchcurrat", 57),
    ("pchdepr", 58),
    ("pchgm_pchsale", 59),
    ("pchquick", 60),
    ("pchsale_pchinvt", 61),
    ("pchsale_pchrect", 62),
    ("pchsale_pchxsga", 63),
    ("pchsaleinv", 64),
    ("pctacc", 65),
    ("ps", 67),
    ("quick", 68),
    ("rd", 69),
    ("rd_mve", 70),
    ("rd_sale", 71),
    ("realestate", 72),
    ("roic", 77),
    ("salecash", 79),
    ("saleinv", 80),
    ("salerec", 81),
    ("secured", 82),
    ("securedind", 83),
    ("sgr", 84),
    ("sin", 85),
    ("sp", 86),
    ("tang", 91),
    ("tb", 92),
];

const QUARTERLY: &[(&str, u16)] = &[
    ("aeavol", 3),
    ("cash", 11),
    ("chtx", 22),
    ("cinvest", 23),
    ("ear", 31),
    ("ms", 50),
    ("nincr", 53),
    ("roaq", 74),
    ("roavol", 75),
    ("roeq", 76),
    ("rsup", 78),
    ("stdacc", 89),
    ("stdcf", 90),
];

const MONTHLY: &[(&str, u16)] = &[
    ("baspread", 6),
    ("beta", 7),
    ("betasq", 8),
    ("chmom", 20),
    ("dolvol", 29),
    ("idiovol", 39),
    ("ill", 40),
    ("indmom", 41),
    ("maxret", 45),
    ("mom12m", 46),
    ("mom1m", 47),
    ("mom36m", 48),
    ("mom6m", 49),
    ("mvel1", 51),
    ("pricedelay", 66),
    ("retvol", 73),
    ("std_dolvol", 87),
    ("std_turn", 88),
    ("turn", 93),
    ("zerotrade", 94),
];

/// Ordered, duplicate-free catalogue of characteristics.
///
/// Registration order is the canonical column order of every output table.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    characteristics: Vec<Characteristic>,
    index: HashMap<String, usize>,
}

impl Taxonomy {
    /// Create a new empty taxonomy.
    pub fn new() -> Self {
        Self::default()
    }

    /// The 94-characteristic catalogue: annual, then quarterly, then monthly.
    pub fn with_defaults() -> Self {
        let mut taxonomy = Self::new();

        let groups = [
            (CharacteristicGroup::Annual, ANNUAL),
            (CharacteristicGroup::Quarterly, QUARTERLY),
            (CharacteristicGroup::Monthly, MONTHLY),
        ];
        for (group, entries) in groups {
            for &(name, id) in entries {
                taxonomy.characteristics.push(Characteristic::new(name, id, group));
            }
        }
        taxonomy.reindex();

        taxonomy
    }

    /// Register a characteristic at the end of the catalogue.
    ///
    /// Names must be unique across all groups.
    pub fn register(&mut self, characteristic: Characteristic) -> Result<()> {
        if self.index.contains_key(&characteristic.name) {
            return Err(PanelError::DuplicateCharacteristic(characteristic.name));
        }
        self.index
            .insert(characteristic.name.clone(), self.characteristics.len());
        self.characteristics.push(characteristic);
        Ok(())
    }

    /// Restrict the taxonomy to `names`, keeping catalogue order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut keep = vec![false; self.characteristics.len()];
        for name in names {
            let name = name.as_ref();
            let position = self
                .index
                .get(name)
                .ok_or_else(|| PanelError::NotFound(name.to_string()))?;
            keep[*position] = true;
        }

        let mut subset = Self::new();
        subset.characteristics = self
            .characteristics
            .iter()
            .zip(keep)
            .filter_map(|(c, k)| k.then(|| c.clone()))
            .collect();
        subset.reindex();
        Ok(subset)
    }

    /// Get a characteristic by name.
    pub fn get(&self, name: &str) -> Option<&Characteristic> {
        self.index.get(name).map(|&i| &self.characteristics[i])
    }

    /// Position of a characteristic in catalogue order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Characteristics of one refresh group, in catalogue order.
    pub fn by_group(&self, group: CharacteristicGroup) -> Vec<&Characteristic> {
        self.characteristics
            .iter()
            .filter(|c| c.group == group)
            .collect()
    }

    /// All characteristics in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.iter()
    }

    /// All characteristic names in catalogue order.
    pub fn names(&self) -> Vec<&str> {
        self.characteristics.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of characteristics.
    pub fn len(&self) -> usize {
        self.characteristics.len()
    }

    /// Whether the taxonomy is empty.
    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }

    fn reindex(&mut self) {
        self.index = self
            .characteristics
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
    }
}
