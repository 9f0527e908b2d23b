//! Stock location codes used by the BE FORWARD stock list

/// Country name to `stock_country` code
pub const COUNTRY_CODES: &[(&str, u32)] = &[
    ("uae", 44),
    ("japan", 1),
    ("korea", 2),
    ("thailand", 3),
    ("uk", 5),
    ("singapore", 6),
    ("australia", 7),
    ("philippines", 8),
    ("belgium", 9),
    ("south_africa", 10),
    ("new_zealand", 11),
    ("tanzania", 12),
    ("zambia", 13),
    ("kenya", 14),
    ("uganda", 15),
    ("mozambique", 16),
    ("zimbabwe", 17),
    ("botswana", 18),
    ("namibia", 19),
    ("lesotho", 20),
    ("malawi", 21),
    ("rwanda", 22),
    ("burundi", 23),
    ("ghana", 24),
    ("senegal", 25),
    ("gabon", 26),
    ("nigeria", 27),
    ("angola", 28),
    ("egypt", 29),
    ("saudi_arabia", 30),
    ("georgia", 31),
    ("germany", 32),
    ("usa", 33),
    ("canada", 34),
    ("ukraine", 35),
    ("armenia", 36),
    ("azerbaijan", 37),
    ("russia", 38),
    ("kyrgyzstan", 39),
    ("bangladesh", 40),
    ("pakistan", 41),
    ("mongolia", 42),
    ("sri_lanka", 43),
    ("mexico", 45),
    ("taiwan", 46),
    ("albania", 47),
];

/// Resolves a country name (case-insensitive) or a raw numeric code
///
/// Returns None for names that are not in [`COUNTRY_CODES`].
pub fn resolve_country(country: &str) -> Option<u32> {
    let country = country.trim();
    if !country.is_empty() && country.chars().all(|c| c.is_ascii_digit()) {
        return country.parse().ok();
    }

    let lower = country.to_lowercase().replace([' ', '-'], "_");
    COUNTRY_CODES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| *code)
}

/// Reverse lookup of a stock code
pub fn country_name(code: u32) -> Option<&'static str> {
    COUNTRY_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}
