use harvest_core::{FieldKey, Parse, Validity};
use serde::{Deserialize, Serialize};

use crate::{DiscoveryTier, Selector, Strategy, StrategyChain, INNER_TEXT};

const PLACE_MARKER: &str = "/maps/place/";

/// Every site-specific selector table the engine consults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Search location with a `{query}` placeholder.
    pub search_url_template: String,
    /// Any of these present means the results list has rendered.
    pub results_markers: Vec<Selector>,
    pub discovery: Vec<DiscoveryTier>,
    /// Scrollable list containers, most specific first.
    pub result_containers: Vec<Selector>,
    pub show_more_controls: Vec<Selector>,
    pub zoom_out_controls: Vec<Selector>,
    /// Any of these present means a detail view has rendered.
    pub detail_markers: Vec<Selector>,
    pub chains: Vec<StrategyChain>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::maps()
    }
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|selector| Selector::css(*selector)).collect()
}

impl SiteProfile {
    /// Selector tables for the public maps search.
    pub fn maps() -> Self {
        Self {
            search_url_template: "https://www.google.com/maps/search/{query}".to_string(),
            results_markers: selectors(&[
                "div.Nv2PK",
                "div[role=\"article\"]",
                "a[href*=\"/maps/place/\"]",
            ]),
            discovery: vec![
                DiscoveryTier::links("div.Nv2PK a[href*=\"/maps/place/\"]", PLACE_MARKER),
                DiscoveryTier::links("div[role=\"article\"] a[href*=\"/maps/place/\"]", PLACE_MARKER),
                DiscoveryTier::links("a.hfpxzc", PLACE_MARKER),
                DiscoveryTier::links("a[href*=\"/maps/place/\"]", PLACE_MARKER),
            ],
            result_containers: selectors(&[
                "div.m6QErb.DxyBCb.kA9KIf.dS8AEf.ecceSd > div.m6QErb.DxyBCb.kA9KIf.dS8AEf.tLjsW",
                "div.e07Vkf.kA9KIf",
                "div[role=\"feed\"]",
            ]),
            show_more_controls: selectors(&[
                "button[aria-label*=\"Show more\"]",
                "button[aria-label*=\"More results\"]",
                "button[jsaction*=\"showMore\"]",
            ]),
            zoom_out_controls: selectors(&[
                "button[aria-label=\"Zoom out\"]",
                "button.widget-zoom-out",
                "div[data-value=\"Zoom out\"] button",
            ]),
            detail_markers: selectors(&[
                "h1.DUwDvf",
                "h1[data-attrid=\"title\"]",
                "div[role=\"main\"]",
            ]),
            chains: maps_chains(),
        }
    }

    /// Search location for `query`; spaces become `+`.
    pub fn search_url(&self, query: &str) -> String {
        let encoded = query.split_whitespace().collect::<Vec<_>>().join("+");
        self.search_url_template.replace("{query}", &encoded)
    }

    pub fn chain(&self, key: FieldKey) -> Option<&StrategyChain> {
        self.chains.iter().find(|chain| chain.key() == key)
    }
}

fn maps_chains() -> Vec<StrategyChain> {
    let name = [
        "h1[data-attrid=\"title\"]",
        "h1.DUwDvf",
        "h1.x3AX1-LfntMc-header-title-title",
        "h1.fontHeadlineLarge",
        "h1",
        ".x3AX1-LfntMc-header-title-title",
        ".DUwDvf",
        ".fontHeadlineLarge",
        "[data-attrid=\"title\"]",
    ]
    .into_iter()
    .fold(StrategyChain::new(FieldKey::Name, Validity::MinChars(2)), |chain, selector| {
        chain.then(Strategy::text(selector))
    })
    .then(Strategy::new(
        "div[role=\"main\"]",
        &["aria-label"],
        Parse::BeforeMarker("stars".to_string()),
    ));

    let address = [
        "[data-item-id=\"address\"]",
        ".Io6YTe.fontBodyMedium.kR99db.fdkmkc",
        ".rogA2c .Io6YTe",
        "button[data-item-id=\"address\"]",
        ".fccl3c .Io6YTe",
        "[data-item-id*=\"address\"]",
    ]
    .into_iter()
    .fold(StrategyChain::new(FieldKey::Address, Validity::Address), |chain, selector| {
        chain.then(Strategy::text(selector))
    })
    .then(Strategy::new(
        "button[aria-label^=\"Address\"]",
        &["aria-label"],
        Parse::Text,
    ));

    let rating = [
        ".F7nice span[aria-hidden=\"true\"]",
        "span.ceNzKf",
        ".MW4etd",
        ".fontDisplayLarge",
    ]
    .into_iter()
    .fold(
        StrategyChain::new(FieldKey::Rating, Validity::Rating { min: 0.0, max: 5.0 }),
        |chain, selector| chain.then(Strategy::new(selector, &[INNER_TEXT], Parse::FirstDecimal)),
    )
    .then(Strategy::new(
        ".ceNzKf[aria-label*=\"stars\"]",
        &["aria-label"],
        Parse::FirstDecimal,
    ));

    let review_count = StrategyChain::new(FieldKey::ReviewCount, Validity::Count)
        .then(Strategy::new(
            ".F7nice span:nth-child(2)",
            &[INNER_TEXT, "aria-label"],
            Parse::FirstInteger,
        ))
        .then(Strategy::new(
            "button[aria-label*=\"reviews\"]",
            &["aria-label", INNER_TEXT],
            Parse::FirstInteger,
        ))
        .then(Strategy::new(".UY7F9", &[INNER_TEXT], Parse::FirstInteger));

    let category = [
        ".DkEaL",
        "button[jsaction*=\"category\"]",
        ".YhemCb",
        ".fontBodyMedium[data-value*=\"category\"]",
    ]
    .into_iter()
    .fold(StrategyChain::new(FieldKey::Category, Validity::MinChars(3)), |chain, selector| {
        chain.then(Strategy::text(selector))
    });

    let website = [
        "a[data-item-id=\"authority\"]",
        "a[href*=\"http\"]:not([href*=\"google.com\"]):not([href*=\"maps\"])",
        ".CsEnBe a[href*=\"http\"]",
        "a[data-item-id*=\"website\"]",
    ]
    .into_iter()
    .fold(
        StrategyChain::new(
            FieldKey::Website,
            Validity::Website {
                excluded: vec!["google.".to_string(), "maps.".to_string()],
            },
        ),
        |chain, selector| chain.then(Strategy::new(selector, &["href"], Parse::Url)),
    );

    let phone_sources = ["aria-label", "href", "data-item-id", INNER_TEXT];
    let phone = [
        "button[data-item-id^=\"phone:tel:\"]",
        "button[data-item-id*=\"phone\"]",
        "div[data-item-id*=\"phone\"] .Io6YTe",
        "a[href^=\"tel:\"]",
        "button[aria-label*=\"Phone\"]",
        "button[aria-label*=\"Call\"]",
    ]
    .into_iter()
    .fold(
        StrategyChain::new(FieldKey::Phone, Validity::Phone).max_handles(10),
        |chain, selector| chain.then(Strategy::new(selector, &phone_sources, Parse::PhoneText)),
    );

    let email = StrategyChain::new(FieldKey::Email, Validity::Email)
        .then(Strategy::new("a[href^=\"mailto:\"]", &["href"], Parse::EmailText))
        .then(Strategy::new(
            "div[data-item-id*=\"email\"]",
            &[INNER_TEXT, "aria-label"],
            Parse::EmailText,
        ))
        .then(Strategy::new("div[role=\"main\"]", &[INNER_TEXT], Parse::EmailText));

    let hours = StrategyChain::new(FieldKey::Hours, Validity::NonEmpty)
        .then(Strategy::text("div[data-item-id*=\"hours\"]"))
        .then(Strategy::new(
            "div[aria-label*=\"hours\"]",
            &["aria-label", INNER_TEXT],
            Parse::Text,
        ));

    vec![
        name,
        address,
        rating,
        review_count,
        category,
        website,
        phone,
        email,
        hours,
    ]
}
