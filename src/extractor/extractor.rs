// src/extractor/extractor.rs
use crate::dom::{Document, NodeId};
use crate::extractor::models::{PropertyData, Site, View};
use crate::extractor::parse::{
    join_address, parse_association_fee, parse_bedrooms, parse_price,
};
use crate::extractor::sites::{profile, FieldRule, ViewProfile};
use log::warn;
use scraper::Selector;

struct CompiledRule {
    selector: Selector,
    keyword: Option<&'static str>,
}

struct CompiledView {
    cards: Vec<Selector>,
    address: Vec<CompiledRule>,
    price: Vec<CompiledRule>,
    bedrooms: Vec<CompiledRule>,
    association_fee: Vec<CompiledRule>,
    anchors: Vec<Selector>,
}

/// Reads listing facts out of card subtrees for one site. Holds only
/// compiled selectors; extraction itself is stateless.
pub struct Extractor {
    site: Site,
    list: CompiledView,
    map: CompiledView,
    detail: CompiledView,
    listings_region: Vec<Selector>,
}

fn compile(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(sel) => Some(sel),
        Err(e) => {
            // A broken selector only disables that one rule.
            warn!("skipping invalid selector {raw:?}: {e:?}");
            None
        }
    }
}

fn compile_all(raw: &[&str]) -> Vec<Selector> {
    raw.iter().filter_map(|s| compile(s)).collect()
}

fn compile_rules(rules: &[FieldRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|r| {
            compile(r.selector).map(|selector| CompiledRule {
                selector,
                keyword: r.keyword,
            })
        })
        .collect()
}

fn compile_view(v: &ViewProfile) -> CompiledView {
    CompiledView {
        cards: compile_all(v.cards),
        address: compile_rules(v.address),
        price: compile_rules(v.price),
        bedrooms: compile_rules(v.bedrooms),
        association_fee: compile_rules(v.association_fee),
        anchors: compile_all(v.anchors),
    }
}

impl Extractor {
    pub fn for_site(site: Site) -> Self {
        let p = profile(site);
        Self {
            site,
            list: compile_view(&p.list),
            map: compile_view(&p.map),
            detail: compile_view(&p.detail),
            listings_region: compile_all(p.listings_region),
        }
    }

    pub fn site(&self) -> Site {
        self.site
    }

    fn view(&self, view: View) -> &CompiledView {
        match view {
            View::List => &self.list,
            View::Map => &self.map,
            View::Detail => &self.detail,
        }
    }

    /// Connected cards for every view, in document order per view. A node
    /// matched by more than one view keeps the first: detail, map, list.
    pub fn find_cards(&self, doc: &Document) -> Vec<(NodeId, View)> {
        let mut out: Vec<(NodeId, View)> = Vec::new();
        for view in [View::Detail, View::Map, View::List] {
            for id in doc.select_any(&self.view(view).cards) {
                if !out.iter().any(|(seen, _)| *seen == id) {
                    out.push((id, view));
                }
            }
        }
        out
    }

    /// Roots of the listings region (list + map containers).
    pub fn listings_regions(&self, doc: &Document) -> Vec<NodeId> {
        doc.select_any(&self.listings_region)
    }

    /// Roots of currently rendered detail panels.
    pub fn detail_regions(&self, doc: &Document) -> Vec<NodeId> {
        doc.select_any(&self.detail.cards)
    }

    /// Badge anchor inside `card`: the address link or heading.
    pub fn anchor(&self, doc: &Document, card: NodeId, view: View) -> Option<NodeId> {
        self.view(view)
            .anchors
            .iter()
            .find_map(|sel| doc.select_within(card, sel).into_iter().next())
    }

    pub fn extract(&self, doc: &Document, card: NodeId, view: View) -> PropertyData {
        let v = self.view(view);

        let address = first_match(doc, card, &v.address, |chunks| join_address(chunks));
        let price = first_match(doc, card, &v.price, |chunks| parse_price(&chunks.join(" ")));
        let bedrooms = first_match(doc, card, &v.bedrooms, |chunks| {
            parse_bedrooms(&chunks.join(" "))
        });
        let association_fee_monthly = first_match(doc, card, &v.association_fee, |chunks| {
            parse_association_fee(&chunks.join(" "))
        });

        PropertyData {
            address,
            bedrooms,
            price,
            association_fee_monthly,
        }
    }
}

/// First value any rule produces, trying every matched element per rule.
fn first_match<T>(
    doc: &Document,
    card: NodeId,
    rules: &[CompiledRule],
    parse: impl Fn(&[String]) -> Option<T>,
) -> Option<T> {
    for rule in rules {
        for id in doc.select_within(card, &rule.selector) {
            if doc.is_overlay_node(id) {
                continue;
            }
            let chunks = doc.text_chunks(id);
            if let Some(keyword) = rule.keyword {
                let text = chunks.join(" ").to_lowercase();
                if !text.contains(&keyword.to_lowercase()) {
                    continue;
                }
            }
            if let Some(value) = parse(&chunks) {
                return Some(value);
            }
        }
    }
    None
}
