// Default registry loaded by `wedding-registry seed`

use crate::models::GiftItem;

const DEFAULT_LINK: &str = "https://shopee.com.my";

/// (id, name, total)
const DEFAULT_ITEMS: [(&str, &str, f64); 4] = [
    ("plates", "Plates", 100.0),
    ("carpet", "Carpet", 200.0),
    ("electric-grinder", "Electric Grinder", 2000.0),
    ("bicycle", "Bicycle", 1000.0),
];

pub fn default_items() -> Vec<GiftItem> {
    DEFAULT_ITEMS
        .iter()
        .map(|(id, name, total)| GiftItem::new(*id, *name, DEFAULT_LINK, *total))
        .collect()
}
