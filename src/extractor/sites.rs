// src/extractor/sites.rs
//
// Selector tables for each supported site. Every view lists the current
// layout first and older/alternate layouts after it; the first rule that
// yields a value wins.

use super::models::{Site, View};

/// A selector plus an optional keyword the matched text must contain
/// (case-insensitive). Keywords let a rule target a generic fact row.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub selector: &'static str,
    pub keyword: Option<&'static str>,
}

const fn rule(selector: &'static str) -> FieldRule {
    FieldRule {
        selector,
        keyword: None,
    }
}

const fn keyed(selector: &'static str, keyword: &'static str) -> FieldRule {
    FieldRule {
        selector,
        keyword: Some(keyword),
    }
}

#[derive(Debug)]
pub struct ViewProfile {
    pub cards: &'static [&'static str],
    pub address: &'static [FieldRule],
    pub price: &'static [FieldRule],
    pub bedrooms: &'static [FieldRule],
    pub association_fee: &'static [FieldRule],
    /// Where the badge goes: the address link (list/map) or heading (detail).
    pub anchors: &'static [&'static str],
}

#[derive(Debug)]
pub struct SiteProfile {
    pub site: Site,
    pub list: ViewProfile,
    pub map: ViewProfile,
    pub detail: ViewProfile,
    pub listings_region: &'static [&'static str],
}

impl SiteProfile {
    pub fn view(&self, view: View) -> &ViewProfile {
        match view {
            View::List => &self.list,
            View::Map => &self.map,
            View::Detail => &self.detail,
        }
    }
}

pub fn profile(site: Site) -> &'static SiteProfile {
    match site {
        Site::Zillow => &ZILLOW,
        Site::Redfin => &REDFIN,
        Site::Realtor => &REALTOR,
    }
}

static ZILLOW: SiteProfile = SiteProfile {
    site: Site::Zillow,
    list: ViewProfile {
        cards: &[
            r#"article[data-test="property-card"]"#,
            "article.list-card",
        ],
        address: &[
            rule(r#"address[data-test="property-card-addr"]"#),
            rule("address.list-card-addr"),
        ],
        price: &[
            rule(r#"span[data-test="property-card-price"]"#),
            rule("div.list-card-price"),
        ],
        bedrooms: &[
            keyed("ul.property-card-details li", "bd"),
            keyed("ul.list-card-details li", "bd"),
            keyed("li", "studio"),
        ],
        association_fee: &[],
        anchors: &["a.property-card-link", "a.list-card-link"],
    },
    map: ViewProfile {
        cards: &[
            r#"div[data-test="map-card"]"#,
            "div.map-popup-card",
        ],
        address: &[
            rule(r#"address[data-test="map-card-addr"]"#),
            rule("div.map-popup-card-address"),
        ],
        price: &[
            rule(r#"span[data-test="map-card-price"]"#),
            rule("div.map-popup-card-price"),
        ],
        bedrooms: &[
            rule(r#"span[data-test="map-card-beds"]"#),
            keyed("div.map-popup-card-details span", "bd"),
        ],
        association_fee: &[],
        anchors: &["a.map-card-link", "a.map-popup-card-link"],
    },
    detail: ViewProfile {
        cards: &[
            r#"div[data-testid="home-details-summary"]"#,
            "div.ds-home-details-chip",
        ],
        address: &[
            rule(r#"h1[data-testid="home-details-address"]"#),
            rule("h1.ds-address-container"),
        ],
        price: &[
            rule(r#"span[data-testid="price"]"#),
            rule("span.ds-summary-row span.ds-value"),
        ],
        bedrooms: &[
            keyed(r#"span[data-testid="bed-bath-item"]"#, "bd"),
            keyed("span.ds-bed-bath-living-area", "bd"),
        ],
        association_fee: &[
            rule(r#"span[data-testid="hoa-fee"]"#),
            keyed("li.ds-home-fact-list-item", "hoa"),
        ],
        anchors: &[
            r#"h1[data-testid="home-details-address"]"#,
            "h1.ds-address-container",
        ],
    },
    listings_region: &["#grid-search-results", "#search-page-map", "#search-page-list-container"],
};

static REDFIN: SiteProfile = SiteProfile {
    site: Site::Redfin,
    list: ViewProfile {
        cards: &["div.HomeCardContainer", "div.MapHomeCardReact"],
        address: &[
            rule("div.bp-Homecard__Address"),
            rule("div.homeAddressV2"),
        ],
        price: &[
            rule("span.bp-Homecard__Price--value"),
            rule("span.homecardV2Price"),
        ],
        bedrooms: &[
            rule("span.bp-Homecard__Stats--beds"),
            keyed("div.HomeStatsV2 div.stats", "bed"),
        ],
        association_fee: &[],
        anchors: &["a.bp-Homecard__Address", "a.slider-item", "div.homeAddressV2"],
    },
    map: ViewProfile {
        cards: &["div.MapPopupHomeCard", "div.map-home-card"],
        address: &[
            rule("div.bp-Homecard__Address"),
            rule("span.map-home-card-address"),
        ],
        price: &[
            rule("span.bp-Homecard__Price--value"),
            rule("span.map-home-card-price"),
        ],
        bedrooms: &[
            rule("span.bp-Homecard__Stats--beds"),
            keyed("span.map-home-card-stats", "bed"),
        ],
        association_fee: &[],
        anchors: &["a.bp-Homecard__Address", "a.map-home-card-link"],
    },
    detail: ViewProfile {
        cards: &[
            r#"div[data-rf-test-id="abp-homeinfo"]"#,
            "div.HomeInfoV2",
        ],
        address: &[
            rule("h1.full-address"),
            rule("div.street-address"),
        ],
        price: &[
            rule(r#"div[data-rf-test-id="abp-price"] div.statsValue"#),
            rule("div.price-section span.price"),
        ],
        bedrooms: &[
            rule(r#"div[data-rf-test-id="abp-beds"] div.statsValue"#),
            keyed("div.stats-section span", "bed"),
        ],
        association_fee: &[
            rule("span.hoa-dues"),
            keyed("div.keyDetail", "hoa"),
        ],
        anchors: &["h1.full-address", "div.street-address"],
    },
    listings_region: &["div.HomeViews", "#results-display", "div.MapContainer"],
};

static REALTOR: SiteProfile = SiteProfile {
    site: Site::Realtor,
    list: ViewProfile {
        cards: &[
            r#"div[data-testid="property-card"]"#,
            "li.component_property-card",
        ],
        address: &[
            rule(r#"div[data-testid="card-address"]"#),
            rule(r#"div[data-label="pc-address"]"#),
        ],
        price: &[
            rule(r#"div[data-testid="card-price"]"#),
            rule(r#"span[data-label="pc-price"]"#),
        ],
        bedrooms: &[
            rule(r#"li[data-testid="property-meta-beds"]"#),
            rule(r#"li[data-label="pc-meta-beds"]"#),
        ],
        association_fee: &[],
        anchors: &[r#"a[data-testid="card-link"]"#, "a.card-anchor"],
    },
    map: ViewProfile {
        cards: &[
            r#"div[data-testid="map-property-card"]"#,
            "div.map-card-container",
        ],
        address: &[
            rule(r#"div[data-testid="card-address"]"#),
            rule("div.map-card-address"),
        ],
        price: &[
            rule(r#"div[data-testid="card-price"]"#),
            rule("div.map-card-price"),
        ],
        bedrooms: &[
            rule(r#"li[data-testid="property-meta-beds"]"#),
            keyed("div.map-card-meta span", "bed"),
        ],
        association_fee: &[],
        anchors: &[r#"a[data-testid="card-link"]"#, "a.map-card-anchor"],
    },
    detail: ViewProfile {
        cards: &[
            r#"div[data-testid="ldp-hero-container"]"#,
            "section.ldp-header",
        ],
        address: &[
            rule(r#"h1[data-testid="address-line-ldp"]"#),
            rule("h1.ldp-header-address"),
        ],
        price: &[
            rule(r#"div[data-testid="ldp-list-price"]"#),
            rule("span.ldp-header-price"),
        ],
        bedrooms: &[
            rule(r#"li[data-testid="property-meta-beds"]"#),
            keyed("ul.ldp-header-meta li", "bed"),
        ],
        association_fee: &[
            rule(r#"li[data-testid="hoa-fee"]"#),
            keyed("ul.ldp-details li", "hoa"),
        ],
        anchors: &[
            r#"h1[data-testid="address-line-ldp"]"#,
            "h1.ldp-header-address",
        ],
    },
    listings_region: &[r#"section[data-testid="property-list"]"#, "ul.property-list", "div.map-view"],
};
