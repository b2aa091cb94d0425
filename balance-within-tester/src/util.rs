use anyhow::{Context, Result, bail};
use balance_within_game::LevelId;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse comma-separated seeds. Accepts decimal or `0x`-prefixed hex.
pub fn parse_seeds(s: &str) -> Result<Vec<u64>> {
    let seeds = split_csv(s)
        .iter()
        .map(|token| {
            let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => token.parse::<u64>(),
            };
            parsed.with_context(|| format!("invalid seed {token:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if seeds.is_empty() {
        bail!("at least one seed is required");
    }
    Ok(seeds)
}

/// Expand `all` and resolve level names or numbers, dropping duplicates.
pub fn parse_levels(s: &str) -> Result<Vec<LevelId>> {
    let mut levels = Vec::new();
    for token in split_csv(s) {
        let resolved: Vec<LevelId> = if token.eq_ignore_ascii_case("all") {
            LevelId::ALL.to_vec()
        } else {
            vec![LevelId::parse(&token).with_context(|| format!("unknown level {token:?}"))?]
        };
        for level in resolved {
            if !levels.contains(&level) {
                levels.push(level);
            }
        }
    }
    if levels.is_empty() {
        bail!("at least one level is required");
    }
    Ok(levels)
}
