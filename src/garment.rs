//! Garment classification from free-text hints (descriptions, product URLs).
//!
//! Every decision is a first-match walk over an ordered rule table, so the
//! priority order lives in data rather than in the shape of the code:
//!
//! * category: one-piece → bottoms → tops → URL path patterns → `auto`
//! * fitting: accessory → layered → loose → fitted → default `fitted`
//! * complexity: complex → moderate → `simple`
//! * segmentation: see [`SEGMENTATION_RULES`]
//!
//! Results are memoized by normalized hint.

use moka::sync::Cache;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Tops,
    Bottoms,
    OnePiece,
    Auto,
}

impl Category {
    /// Token in the provider's vocabulary.
    pub fn provider_token(&self) -> &'static str {
        match self {
            Category::Tops => "tops",
            Category::Bottoms => "bottoms",
            Category::OnePiece => "one-pieces",
            Category::Auto => "auto",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Tops => write!(f, "tops"),
            Category::Bottoms => write!(f, "bottoms"),
            Category::OnePiece => write!(f, "one-piece"),
            Category::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FittingType {
    Fitted,
    Loose,
    Layered,
    Accessory,
}

impl std::fmt::Display for FittingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FittingType::Fitted => write!(f, "fitted"),
            FittingType::Loose => write!(f, "loose"),
            FittingType::Layered => write!(f, "layered"),
            FittingType::Accessory => write!(f, "accessory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

/// Request parameters derived from a garment hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarmentProfile {
    pub category: Category,
    pub fitting_type: FittingType,
    pub complexity: Complexity,
    pub skip_segmentation: bool,
}

const ONE_PIECE_KEYWORDS: &[&str] = &[
    "dress", "dresses", "gown", "jumpsuit", "jumpsuits", "romper", "rompers", "overalls",
    "playsuit", "onesie", "bodysuit", "catsuit", "kaftan", "sundress", "maxi dress",
    "one piece", "swimsuit",
];

const BOTTOMS_KEYWORDS: &[&str] = &[
    "pants", "trousers", "jeans", "skirt", "skirts", "shorts", "leggings", "joggers",
    "chinos", "culottes", "sweatpants", "slacks", "cargo pants", "bermuda", "capris",
];

const TOPS_KEYWORDS: &[&str] = &[
    "shirt", "shirts", "tshirt", "tee", "blouse", "top", "tops", "jacket", "jackets",
    "sweater", "hoodie", "cardigan", "coat", "blazer", "vest", "tank", "polo", "crop top",
    "pullover", "sweatshirt", "jumper", "tunic", "camisole", "parka", "windbreaker", "bomber",
];

/// Path fragments tried against the raw hint when no keyword matched.
const URL_CATEGORY_PATTERNS: &[(&str, Category)] = &[
    ("/dress", Category::OnePiece),
    ("/jumpsuit", Category::OnePiece),
    ("/one-piece", Category::OnePiece),
    ("/pant", Category::Bottoms),
    ("/jean", Category::Bottoms),
    ("/skirt", Category::Bottoms),
    ("/short", Category::Bottoms),
    ("/bottom", Category::Bottoms),
    ("/top", Category::Tops),
    ("/shirt", Category::Tops),
    ("/tee", Category::Tops),
    ("/outerwear", Category::Tops),
    ("/knit", Category::Tops),
];

const ACCESSORY_KEYWORDS: &[&str] = &[
    "scarf", "hat", "cap", "beanie", "belt", "bag", "handbag", "necklace", "jewelry",
    "sunglasses", "gloves", "necktie", "bowtie", "watch", "earrings",
];

const LAYERED_KEYWORDS: &[&str] = &[
    "jacket", "coat", "blazer", "cardigan", "vest", "parka", "windbreaker", "bomber",
    "overcoat", "trench", "shacket", "overshirt", "poncho", "cape", "outerwear", "kimono",
];

const LOOSE_KEYWORDS: &[&str] = &[
    "oversized", "loose", "baggy", "relaxed", "flowy", "wide leg", "boyfriend", "slouchy",
    "boxy", "flared", "palazzo", "a line",
];

const FITTED_KEYWORDS: &[&str] = &[
    "fitted", "tight", "bodycon", "slim", "skinny", "compression", "stretch", "form fitting",
    "swim", "swimwear", "bikini", "swimsuit", "lingerie", "underwear", "bra", "briefs",
    "corset", "leotard",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "pattern", "patterned", "print", "printed", "floral", "embroidery", "embroidered", "lace",
    "sequin", "sequins", "beaded", "graphic", "logo", "paisley", "tie dye", "ruffle", "ruffles",
];

const MODERATE_KEYWORDS: &[&str] = &[
    "button", "buttons", "buttoned", "pocket", "pockets", "collar", "collared", "stripe",
    "stripes", "striped", "plaid", "check", "checked", "zip", "zipper", "pleated", "denim",
];

const CATEGORY_RULES: &[(&[&str], Category)] = &[
    (ONE_PIECE_KEYWORDS, Category::OnePiece),
    (BOTTOMS_KEYWORDS, Category::Bottoms),
    (TOPS_KEYWORDS, Category::Tops),
];

const FITTING_RULES: &[(&[&str], FittingType)] = &[
    (ACCESSORY_KEYWORDS, FittingType::Accessory),
    (LAYERED_KEYWORDS, FittingType::Layered),
    (LOOSE_KEYWORDS, FittingType::Loose),
    (FITTED_KEYWORDS, FittingType::Fitted),
];

const COMPLEXITY_RULES: &[(&[&str], Complexity)] = &[
    (COMPLEX_KEYWORDS, Complexity::Complex),
    (MODERATE_KEYWORDS, Complexity::Moderate),
];

/// Condition on the classified category and the fitting signal (if any
/// fitting keyword matched).
#[derive(Debug, Clone, Copy)]
pub enum SegmentationWhen {
    Category(Category),
    Fitting(FittingType),
    CategoryWithoutFitting(Category),
    Always,
}

/// `skip_segmentation` decision table, first match wins. One-pieces replace
/// the whole outfit; items worn over or loosely around the body layer.
pub const SEGMENTATION_RULES: &[(SegmentationWhen, bool)] = &[
    (SegmentationWhen::Category(Category::OnePiece), false),
    (SegmentationWhen::Fitting(FittingType::Layered), true),
    (SegmentationWhen::Fitting(FittingType::Accessory), true),
    (SegmentationWhen::Fitting(FittingType::Loose), true),
    (SegmentationWhen::Fitting(FittingType::Fitted), false),
    (SegmentationWhen::CategoryWithoutFitting(Category::Bottoms), false),
    (SegmentationWhen::CategoryWithoutFitting(Category::Tops), false),
    (SegmentationWhen::Always, false),
];

/// Lowercase, non-alphanumerics to single spaces, padded so phrase lookups
/// can match on word boundaries with `" kw "`.
fn normalize(hint: &str) -> String {
    let mut out = String::with_capacity(hint.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in hint.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

fn mentions(normalized: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|kw| normalized.contains(&format!(" {kw} ")))
}

fn first_match<T: Copy>(normalized: &str, rules: &[(&[&str], T)]) -> Option<T> {
    rules
        .iter()
        .find(|(keywords, _)| mentions(normalized, keywords))
        .map(|&(_, value)| value)
}

fn category_from_url(raw_lower: &str) -> Option<Category> {
    URL_CATEGORY_PATTERNS
        .iter()
        .find(|(pattern, _)| raw_lower.contains(pattern))
        .map(|&(_, category)| category)
}

fn skip_segmentation(category: Category, fitting: Option<FittingType>) -> bool {
    SEGMENTATION_RULES
        .iter()
        .find(|(when, _)| match *when {
            SegmentationWhen::Category(c) => c == category,
            SegmentationWhen::Fitting(f) => fitting == Some(f),
            SegmentationWhen::CategoryWithoutFitting(c) => fitting.is_none() && c == category,
            SegmentationWhen::Always => true,
        })
        .is_some_and(|&(_, skip)| skip)
}

/// Pure classification without the cache.
pub fn classify_uncached(hint: &str) -> GarmentProfile {
    let normalized = normalize(hint);
    let raw_lower = hint.to_lowercase();

    let category = first_match(&normalized, CATEGORY_RULES)
        .or_else(|| category_from_url(&raw_lower))
        .unwrap_or(Category::Auto);
    let fitting = first_match(&normalized, FITTING_RULES);
    let complexity = first_match(&normalized, COMPLEXITY_RULES).unwrap_or(Complexity::Simple);

    GarmentProfile {
        category,
        fitting_type: fitting.unwrap_or(FittingType::Fitted),
        complexity,
        skip_segmentation: skip_segmentation(category, fitting),
    }
}

/// Memoizing classifier. Cloning shares the cache.
#[derive(Clone)]
pub struct GarmentAnalyzer {
    cache: Cache<String, GarmentProfile>,
}

impl Default for GarmentAnalyzer {
    fn default() -> Self {
        Self::new(512)
    }
}

impl GarmentAnalyzer {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn classify(&self, hint: &str) -> GarmentProfile {
        let key = hint.trim().to_lowercase();
        self.cache.get_with(key, || {
            let profile = classify_uncached(hint);
            tracing::debug!(
                hint,
                category = %profile.category,
                fitting = %profile.fitting_type,
                complexity = %profile.complexity,
                skip_segmentation = profile.skip_segmentation,
                "Garment classified",
            );
            profile
        })
    }
}
