//! Mod portal categories

use std::fmt;

use crate::mods::error::Error;

/// Single category describing a mod on the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    NoCategory,
    /// Mods introducing new content into the game
    Content,
    /// Large total conversion mods
    Overhaul,
    /// Small changes concerning balance, gameplay, or graphics
    Tweaks,
    /// New tools or interface adjustments that don't change gameplay
    Utilities,
    /// Scenarios, maps, puzzles
    Scenarios,
    /// Collections of mods with tweaks to make them work together
    ModPacks,
    /// Translations for other mods
    Localizations,
    /// Lua libraries and submods that are parts of a larger mod
    Internal,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::NoCategory,
        Category::Content,
        Category::Overhaul,
        Category::Tweaks,
        Category::Utilities,
        Category::Scenarios,
        Category::ModPacks,
        Category::Localizations,
        Category::Internal,
    ];

    /// Returns the name the portal uses for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NoCategory => "no-category",
            Category::Content => "content",
            Category::Overhaul => "overhaul",
            Category::Tweaks => "tweaks",
            Category::Utilities => "utilities",
            Category::Scenarios => "scenarios",
            Category::ModPacks => "mod-packs",
            Category::Localizations => "localizations",
            Category::Internal => "internal",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown category: {:?}", s)))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
