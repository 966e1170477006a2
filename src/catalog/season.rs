use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::client::Episode;

pub const SPECIALS: &str = "Specials";

static SEASON_PATTERN: OnceLock<Regex> = OnceLock::new();

fn season_pattern() -> &'static Regex {
    SEASON_PATTERN.get_or_init(|| Regex::new(r"(?i)0?(\d+)x(\d+)").unwrap())
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonGroup {
    pub season: String,
    pub episodes: Vec<Episode>,
}

/// Buckets episodes by the `SxE` marker in their title ("1x04",
/// "01x04"). Anything without a marker lands under "Specials". Groups
/// keep first-appearance order, episodes keep file order.
pub fn group_by_season(episodes: Vec<Episode>) -> Vec<SeasonGroup> {
    let mut groups: Vec<SeasonGroup> = Vec::new();

    for episode in episodes {
        let season = season_pattern()
            .captures(&episode.title)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .map(|n| format!("Season {}", n))
            .unwrap_or_else(|| SPECIALS.to_string());

        match groups.iter_mut().find(|g| g.season == season) {
            Some(group) => group.episodes.push(episode),
            None => groups.push(SeasonGroup {
                season,
                episodes: vec![episode],
            }),
        }
    }

    groups
}
