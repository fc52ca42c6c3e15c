use serde::Serialize;

/// A streaming service the client can offer as a filter
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct KnownProvider {
    /// TMDB provider id
    pub id: u32,
    /// Display name used in prompts and the client
    pub name: &'static str,
}

/// Providers offered by the client, keyed by TMDB provider id
pub const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider { id: 8, name: "Netflix" },
    KnownProvider { id: 9, name: "Amazon Prime Video" },
    KnownProvider { id: 337, name: "Disney Plus" },
    KnownProvider { id: 350, name: "Apple TV Plus" },
    KnownProvider { id: 15, name: "Hulu" },
    KnownProvider { id: 384, name: "Paramount+" },
    KnownProvider { id: 531, name: "Peacock" },
    KnownProvider { id: 103, name: "Now TV" },
    KnownProvider { id: 188, name: "BBC iPlayer" },
    KnownProvider { id: 35, name: "All 4" },
    KnownProvider { id: 526, name: "Mubi" },
    KnownProvider { id: 682, name: "BFI Player" },
    KnownProvider { id: 521, name: "Curzon Home Cinema" },
    KnownProvider { id: 532, name: "Arrow Player" },
    KnownProvider { id: 445, name: "Rakuten TV" },
    KnownProvider { id: 2, name: "Apple iTunes" },
    KnownProvider { id: 68, name: "Microsoft Store" },
];

/// Display name of a known provider
pub fn provider_name(id: u32) -> Option<&'static str> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == id).map(|p| p.name)
}

/// Names of the known providers among `ids`, in request order
pub fn provider_names(ids: &[u32]) -> Vec<&'static str> {
    ids.iter().filter_map(|&id| provider_name(id)).collect()
}
