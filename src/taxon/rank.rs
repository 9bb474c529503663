//! Taxonomic rank levels, used only for diagnostic level labels in logs.

/// Numeric level for a rank name, most specific lowest (species 10,
/// kingdom 70). Unknown ranks map to 100, sorting them after everything
/// recognized.
pub fn rank_level(rank: &str) -> f32 {
    match rank {
        "form" | "infrahybrid" | "variety" | "subspecies" => 5.0,
        "hybrid" | "species" => 10.0,
        "complex" => 11.0,
        "subsection" => 12.0,
        "section" => 13.0,
        "subgenus" => 15.0,
        "genushybrid" | "genus" => 20.0,
        "subtribe" => 24.0,
        "tribe" => 25.0,
        "supertribe" => 26.0,
        "subfamily" => 27.0,
        "family" => 30.0,
        "epifamily" => 32.0,
        "superfamily" => 33.0,
        "zoosubsection" => 33.5,
        "zoosection" => 34.0,
        "parvorder" => 34.5,
        "infraorder" => 35.0,
        "suborder" => 37.0,
        "order" => 40.0,
        "superorder" => 43.0,
        "subterclass" => 44.0,
        "infraclass" => 45.0,
        "subclass" => 47.0,
        "class" => 50.0,
        "superclass" => 53.0,
        "subphylum" => 57.0,
        "phylum" => 60.0,
        "subkingdom" => 67.0,
        "kingdom" => 70.0,
        "stateofmatter" => 100.0,
        _ => 100.0,
    }
}

/// Human label for the ranks present at one depth level, e.g.
/// "species through genus". Single rank passes through unchanged.
pub fn format_rank_range(ranks: &[&str]) -> String {
    match ranks {
        [] => String::new(),
        [only] => (*only).to_string(),
        _ => {
            let mut sorted: Vec<&str> = ranks.to_vec();
            sorted.sort_by(|a, b| {
                rank_level(a)
                    .partial_cmp(&rank_level(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            format!("{} through {}", sorted[0], sorted[sorted.len() - 1])
        }
    }
}
