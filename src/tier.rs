/// Supporter tier of a caller, lowest first.
///
/// Ordering follows the declaration order (rank), not the spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Follower = 0,
    Bronze = 1,
    Silver = 2,
    Gold = 3,
}

impl Tier {
    /// Tier assumed for a caller that did not state one.
    pub const DEFAULT_CALLER: Tier = Tier::Follower;

    /// Tier a locked mod requires when its manifest does not say.
    pub const DEFAULT_REQUIRED: Tier = Tier::Gold;

    /// Parse an exact, lowercase tier name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "follower" => Some(Tier::Follower),
            "bronze" => Some(Tier::Bronze),
            "silver" => Some(Tier::Silver),
            "gold" => Some(Tier::Gold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Follower => "follower",
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }

    pub fn satisfies(&self, required: Tier) -> bool {
        *self >= required
    }
}
