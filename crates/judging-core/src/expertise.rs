//! Expertise heuristic used to rank candidate judges for an entry.

/// Sector keywords scored when no override is configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "technology",
    "manufacturing",
    "retail",
    "services",
    "export",
];

/// Bonus when the award category appears in the judge's notes.
pub const CATEGORY_BONUS: u32 = 10;

/// Bonus per keyword shared by category and notes.
pub const KEYWORD_BONUS: u32 = 5;

/// Score how well a judge's notes fit an award category.
///
/// Matching is case-insensitive substring search. An empty category earns
/// no category bonus.
pub fn expertise_score<S: AsRef<str>>(notes: &str, category: &str, keywords: &[S]) -> u32 {
    let notes = notes.to_lowercase();
    let category = category.to_lowercase();

    let mut score = 0;
    if !category.is_empty() && notes.contains(&category) {
        score += CATEGORY_BONUS;
    }
    for keyword in keywords {
        let keyword = keyword.as_ref().to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        if category.contains(&keyword) && notes.contains(&keyword) {
            score += KEYWORD_BONUS;
        }
    }
    score
}
