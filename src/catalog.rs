use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::{Category, Comment, CommentView, Product, ProductInfo, ProductSummary};
use crate::store::{decode, decode_valid, Collection, Document, Filter, RecordStore, StoreError};

/// Listings never return more than this many products.
pub const LISTING_LIMIT: usize = 14;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("product {0} not found")]
    ProductNotFound(String),

    #[error("category {0} not found")]
    CategoryNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validated `/products` query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub category: Option<i64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Listing {
    /// Empty values count as absent. A bound that is not a number matches no
    /// product, so such a listing comes back empty rather than rejected.
    pub fn parse(cat: &str, min: Option<&str>, max: Option<&str>) -> Self {
        fn bound(raw: Option<&str>) -> Option<f64> {
            raw.map(str::trim)
                .filter(|raw| !raw.is_empty())
                .map(|raw| raw.parse::<f64>().unwrap_or(f64::NAN))
        }

        Listing {
            category: cat.trim().parse::<i64>().ok(),
            min: bound(min),
            max: bound(max),
        }
    }

    fn has_price_bounds(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Comments on `product_id`, in store order.
pub fn comments_for_product(comments: Vec<Comment>, product_id: &str) -> Vec<CommentView> {
    comments
        .into_iter()
        .filter(|comment| comment.product_id == product_id)
        .map(CommentView::from)
        .collect()
}

pub fn product_detail(product: Product, category: &Category) -> ProductInfo {
    ProductInfo {
        id: product.id,
        category: category.name.clone(),
        name: product.name,
        summary: product.summary,
        description: product.description,
        cost: product.cost,
        currency: product.currency,
        sold_count: product.sold_count,
        images: product.images,
        related: product.related,
    }
}

/// Price-range listing.
///
/// The category narrows an accumulator that is still empty at that point,
/// so it never changes the result: a listing without price bounds is empty,
/// and a listing with bounds covers every category. Existing clients rely
/// on this, so it is kept as is.
pub fn filter_products(products: Vec<Product>, listing: &Listing) -> Vec<ProductSummary> {
    let mut collected: Vec<ProductSummary> = Vec::new();

    if let Some(category) = listing.category {
        collected.retain(|product| product.category == category);
    }

    if listing.has_price_bounds() {
        let min = listing.min.unwrap_or(0.0);
        let max = listing.max.unwrap_or(f64::INFINITY);
        collected = products
            .into_iter()
            .filter(|product| product.cost >= min && product.cost <= max)
            .map(ProductSummary::from)
            .collect();
    }

    collected.truncate(LISTING_LIMIT);
    collected
}

pub fn find_product(store: &dyn RecordStore, id: &str) -> Result<Option<Product>, StoreError> {
    store
        .find_one(Collection::Products, &Filter::eq("id", id))?
        .map(|doc| decode(Collection::Products, doc))
        .transpose()
}

pub fn find_category(store: &dyn RecordStore, id: i64) -> Result<Option<Category>, StoreError> {
    store
        .find_one(Collection::Categories, &Filter::eq("id", id))?
        .map(|doc| decode(Collection::Categories, doc))
        .transpose()
}

/// Matches `product_id` whether it was stored as text or as a number.
fn refers_to(doc: &Document, product_id: &str) -> bool {
    match doc.get("product_id") {
        Some(Value::String(id)) => id == product_id,
        Some(Value::Number(id)) => id.to_string() == product_id,
        _ => false,
    }
}

pub fn get_comments(store: &dyn RecordStore, product_id: &str) -> Result<Vec<CommentView>, StoreError> {
    let matching: Vec<Document> = store
        .find(Collection::Comments)?
        .into_iter()
        .filter(|doc| refers_to(doc, product_id))
        .collect();
    let comments: Vec<Comment> = decode_valid(Collection::Comments, matching);
    let collected = comments_for_product(comments, product_id);
    debug!("Found {} comments for product {}", collected.len(), product_id);
    Ok(collected)
}

pub fn get_product_info(store: &dyn RecordStore, product_id: &str) -> Result<ProductInfo, LookupError> {
    let product = find_product(store, product_id)?
        .ok_or_else(|| LookupError::ProductNotFound(product_id.to_string()))?;
    let category = find_category(store, product.category)?
        .ok_or(LookupError::CategoryNotFound(product.category))?;
    Ok(product_detail(product, &category))
}

pub fn get_products(store: &dyn RecordStore, listing: &Listing) -> Result<Vec<ProductSummary>, StoreError> {
    let products: Vec<Product> = decode_valid(Collection::Products, store.find(Collection::Products)?);
    Ok(filter_products(products, listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{encode, FileStore};

    fn product(id: &str, category: i64, cost: f64) -> Product {
        Product {
            internal_id: Some(format!("internal-{}", id)),
            id: id.to_string(),
            category,
            name: format!("Product {}", id),
            summary: "summary".to_string(),
            description: "description".to_string(),
            cost,
            currency: "USD".to_string(),
            sold_count: 0,
            images: vec!["img/1.jpg".to_string()],
            related: None,
        }
    }

    fn comment(product_id: &str, user: &str, score: f64) -> Comment {
        Comment {
            internal_id: Some(format!("c-{}", user)),
            product_id: product_id.to_string(),
            user: user.to_string(),
            description: "nice".to_string(),
            date_time: "2020-02-21 15:05:22".to_string(),
            score,
        }
    }

    #[test]
    fn comments_for_product_keeps_order_and_drops_others() {
        let comments = vec![
            comment("P1", "ana", 5.0),
            comment("P2", "bob", 1.0),
            comment("P1", "eva", 3.0),
        ];

        let found = comments_for_product(comments, "P1");
        let users: Vec<_> = found.iter().map(|c| c.user.as_str()).collect();
        assert_eq!(users, vec!["ana", "eva"]);
        assert_eq!(found[1].score, 3.0);

        assert!(comments_for_product(vec![comment("P2", "bob", 1.0)], "P1").is_empty());
    }

    #[test]
    fn product_detail_uses_category_name() {
        let category = Category {
            internal_id: None,
            id: 4,
            name: "Autos".to_string(),
        };
        let info = product_detail(product("P1", 4, 10.0), &category);
        assert_eq!(info.category, "Autos");

        let body = serde_json::to_value(&info).unwrap();
        assert!(body.get("_id").is_none());
        assert_eq!(body["category"], "Autos");
        assert_eq!(body["description"], "description");
    }

    #[test]
    fn category_alone_yields_nothing() {
        let products = (0..5).map(|i| product(&i.to_string(), 1, 10.0)).collect();
        let listing = Listing {
            category: Some(1),
            ..Listing::default()
        };
        assert!(filter_products(products, &listing).is_empty());
    }

    #[test]
    fn price_range_is_inclusive_and_ignores_category() {
        let products = vec![
            product("cheap", 1, 9.99),
            product("low", 1, 10.0),
            product("mid", 2, 15.0),
            product("high", 3, 20.0),
            product("pricey", 1, 20.01),
        ];
        let listing = Listing {
            category: Some(1),
            min: Some(10.0),
            max: Some(20.0),
        };

        let found = filter_products(products, &listing);
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["low", "mid", "high"]);

        for summary in &found {
            let body = serde_json::to_value(summary).unwrap();
            assert!(body.get("_id").is_none());
            assert!(body.get("description").is_none());
        }
    }

    #[test]
    fn single_bound_defaults_the_other() {
        let products = vec![product("a", 1, 0.0), product("b", 1, 1_000_000.0)];

        let only_min = Listing::parse("1", Some("500"), None);
        let found = filter_products(products.clone(), &only_min);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");

        let only_max = Listing::parse("1", None, Some("500"));
        let found = filter_products(products, &only_max);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[test]
    fn listing_is_capped() {
        let products: Vec<_> = (0..40).map(|i| product(&format!("p{}", i), 1, i as f64)).collect();
        let listing = Listing {
            category: None,
            min: Some(0.0),
            max: None,
        };

        let found = filter_products(products, &listing);
        assert_eq!(found.len(), LISTING_LIMIT);
        assert_eq!(found.first().unwrap().id, "p0");
        assert_eq!(found.last().unwrap().id, "p13");
    }

    #[test]
    fn listing_parse_rules() {
        assert_eq!(
            Listing::parse("3", Some(""), Some(" ")),
            Listing {
                category: Some(3),
                min: None,
                max: None
            }
        );
        assert_eq!(Listing::parse("autos", None, None).category, None);
    }

    #[test]
    fn non_numeric_bound_matches_nothing() {
        let products: Vec<_> = (0..3).map(|i| product(&i.to_string(), 1, i as f64)).collect();

        let listing = Listing::parse("1", Some("ten"), None);
        assert!(listing.min.unwrap().is_nan());
        assert!(filter_products(products.clone(), &listing).is_empty());
        assert!(filter_products(products, &Listing::parse("1", None, Some("cheap"))).is_empty());
    }

    fn seed(store: &FileStore, collection: Collection, value: serde_json::Value) {
        match value {
            Value::Object(doc) => {
                store.save(collection, doc).unwrap();
            }
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn malformed_comment_on_another_product_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::connect(dir.path()).unwrap();
        seed(&store, Collection::Comments, serde_json::json!({
            "product_id": "P1",
            "user": "ana",
            "description": "fine",
            "dateTime": "2020-02-21 15:05:22",
            "score": 4
        }));
        seed(&store, Collection::Comments, serde_json::json!({
            "product_id": "P2",
            "user": "bob",
            "description": "broken",
            "dateTime": "2020-02-21 15:05:22",
            "score": "n/a"
        }));
        seed(&store, Collection::Comments, serde_json::json!({
            "product_id": "P2",
            "description": "no user, no date",
            "score": 1
        }));

        let found = get_comments(&store, "P1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user, "ana");
        assert!(get_comments(&store, "P2").unwrap().is_empty());
        assert!(get_comments(&store, "P3").unwrap().is_empty());
    }

    #[test]
    fn numeric_product_id_on_comment_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::connect(dir.path()).unwrap();
        seed(&store, Collection::Comments, serde_json::json!({
            "product_id": 77,
            "user": "eva",
            "description": "ok",
            "dateTime": "2020-02-21 15:05:22",
            "score": 2
        }));
        assert_eq!(get_comments(&store, "77").unwrap().len(), 1);
    }

    #[test]
    fn legacy_product_records_stay_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::connect(dir.path()).unwrap();
        for (id, images) in [
            ("1000AAAA", serde_json::json!(["a.jpg"])),
            ("1001AAAB", serde_json::json!([null])),
            ("1002AAAC", serde_json::json!([["b.jpg", "c.jpg"]])),
        ] {
            seed(&store, Collection::Products, serde_json::json!({
                "id": id,
                "category": 1,
                "name": "Car",
                "summary": "s",
                "description": "d",
                "cost": 10,
                "currency": "USD",
                "soldCount": 0,
                "images": images
            }));
        }
        seed(&store, Collection::Products, serde_json::json!({ "id": "broken", "cost": "free" }));

        let listing = Listing::parse("1", Some("0"), None);
        let found = get_products(&store, &listing).unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1000AAAA", "1001AAAB", "1002AAAC"]);
        assert!(found[1].images.is_empty());
        assert_eq!(found[2].images, vec!["b.jpg", "c.jpg"]);
    }

    #[test]
    fn product_info_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::connect(dir.path()).unwrap();
        let category = Category {
            internal_id: None,
            id: 2,
            name: "Motos".to_string(),
        };
        store
            .save(Collection::Categories, encode(Collection::Categories, &category).unwrap())
            .unwrap();
        let mut stored = product("P9", 2, 99.0);
        stored.internal_id = None;
        store
            .save(Collection::Products, encode(Collection::Products, &stored).unwrap())
            .unwrap();

        let info = get_product_info(&store, "P9").unwrap();
        assert_eq!(info.category, "Motos");
        assert!(matches!(
            get_product_info(&store, "missing"),
            Err(LookupError::ProductNotFound(_))
        ));

        let mut orphan = product("P10", 7, 1.0);
        orphan.internal_id = None;
        store
            .save(Collection::Products, encode(Collection::Products, &orphan).unwrap())
            .unwrap();
        assert!(matches!(
            get_product_info(&store, "P10"),
            Err(LookupError::CategoryNotFound(7))
        ));
    }
}
