use crate::models::TmdbMovie;

/// Picks the catalog result that best fits a suggested title.
///
/// Preference order: same title and year, same title, same year, then the
/// catalog's own top result. Title comparison ignores case and surrounding
/// whitespace.
pub fn best_match<'a>(
    results: &'a [TmdbMovie],
    title: &str,
    year: Option<i32>,
) -> Option<&'a TmdbMovie> {
    let wanted = title.trim().to_lowercase();
    let same_title = |m: &&TmdbMovie| m.display_title().trim().to_lowercase() == wanted;
    let same_year = |m: &&TmdbMovie| year.is_some() && m.release_year() == year;

    results
        .iter()
        .find(|m| same_title(m) && same_year(m))
        .or_else(|| results.iter().find(same_title))
        .or_else(|| results.iter().find(same_year))
        .or_else(|| results.first())
}
