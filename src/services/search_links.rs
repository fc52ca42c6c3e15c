use reqwest::Url;

use crate::models::SearchLinks;

fn with_query(base: &str, query: &str) -> String {
    match Url::parse_with_params(base, &[("q", query)]) {
        Ok(url) => url.to_string(),
        Err(_) => base.to_string(),
    }
}

fn search_terms(title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{} {}", title, year),
        None => title.to_string(),
    }
}

pub fn imdb_search_url(title: &str, year: Option<i32>) -> String {
    with_query("https://www.imdb.com/find", &search_terms(title, year))
}

pub fn letterboxd_search_url(title: &str) -> String {
    let mut url = match Url::parse("https://letterboxd.com/search/") {
        Ok(url) => url,
        Err(_) => return String::new(),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(title).push("");
    }
    url.to_string()
}

pub fn google_search_url(title: &str, year: Option<i32>) -> String {
    with_query(
        "https://www.google.com/search",
        &format!("{} movie", search_terms(title, year)),
    )
}

/// All manual search links for an unresolved title
pub fn search_links(title: &str, year: Option<i32>) -> SearchLinks {
    SearchLinks {
        imdb: imdb_search_url(title, year),
        letterboxd: letterboxd_search_url(title),
        google: google_search_url(title, year),
    }
}
