//! Agent name vocabulary, generation, and validation
//!
//! Agent names are adjective+noun concatenations (e.g. `BlueLake`,
//! `GreenRiver`) sampled from two fixed 16-word vocabularies. The
//! vocabularies are a stable-identity contract: changing either list is a
//! compatibility break for existing agent names.

/// Valid adjectives for agent names (16 total).
pub const ADJECTIVES: &[&str] = &[
    "Red", "Orange", "Yellow", "Purple", "Blue", "Green", "Amber", "Coral", "Crimson", "Gold",
    "Indigo", "Jade", "Scarlet", "Silver", "Teal", "Violet",
];

/// Valid nouns for agent names (16 total).
pub const NOUNS: &[&str] = &[
    "Stone", "Lake", "Creek", "River", "Mountain", "Hill", "Forest", "Valley", "Meadow", "Island",
    "Glacier", "Spring", "Reef", "Ridge", "Peak", "Grove",
];

// Sampling draws one nibble per list.
const _: () = assert!(ADJECTIVES.len() == 16 && NOUNS.len() == 16);

/// Maximum stored length of an agent name.
const MAX_NAME_LEN: usize = 128;

/// Normalize a caller-provided agent name; return `None` if nothing remains.
///
/// Keeps `[A-Za-z0-9]` only and stops at 128 characters.
#[must_use]
pub fn sanitize_agent_name(value: &str) -> Option<String> {
    let mut cleaned = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            cleaned.push(c);
            if cleaned.len() == MAX_NAME_LEN {
                break;
            }
        }
    }
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Whether a name is drawn from the adjective+noun ensemble.
///
/// Case-insensitive: `BlueLake`, `bluelake`, and `BLUELAKE` are the same
/// agent identity. Decided by splitting the name on each adjective prefix
/// and checking the remainder against the noun list; with 16+16 words a
/// linear scan beats materializing all 256 combinations.
#[must_use]
pub fn is_valid_agent_name(name: &str) -> bool {
    if !name.is_ascii() {
        return false;
    }
    ADJECTIVES.iter().any(|adj| {
        name.len() > adj.len()
            && name[..adj.len()].eq_ignore_ascii_case(adj)
            && NOUNS
                .iter()
                .any(|noun| name[adj.len()..].eq_ignore_ascii_case(noun))
    })
}

/// One round of splitmix64. Good enough dispersion for picking two nibbles;
/// not shared, not cryptographic.
const fn mix(state: u64) -> u64 {
    let z = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    let z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Generate a random valid agent name.
///
/// Seeded per call from the wall clock and process id; collisions with
/// existing names are tolerated (registration upserts) and higher layers
/// may retry for uniqueness.
#[must_use]
pub fn generate_agent_name() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    #[allow(clippy::cast_possible_truncation)]
    let seed = (nanos as u64) ^ ((nanos >> 64) as u64) ^ u64::from(std::process::id());
    let roll = mix(seed);

    let adjective = ADJECTIVES[(roll & 0xF) as usize];
    let noun = NOUNS[((roll >> 8) & 0xF) as usize];
    format!("{adjective}{noun}")
}
