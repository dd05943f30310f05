use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(deserialize_with = "coerce::integer")]
    pub id: i64,
    #[serde(deserialize_with = "coerce::text")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Product {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(deserialize_with = "coerce::text")]
    pub id: String,
    #[serde(deserialize_with = "coerce::integer")]
    pub category: i64,
    #[serde(deserialize_with = "coerce::text")]
    pub name: String,
    #[serde(deserialize_with = "coerce::text")]
    pub summary: String,
    #[serde(deserialize_with = "coerce::text")]
    pub description: String,
    #[serde(deserialize_with = "coerce::number")]
    pub cost: f64,
    #[serde(deserialize_with = "coerce::text")]
    pub currency: String,
    #[serde(rename = "soldCount", default, deserialize_with = "coerce::integer")]
    pub sold_count: i64,
    #[serde(default, deserialize_with = "coerce::text_list")]
    pub images: Vec<String>,
    // Never populated; kept so stored records with the field still load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<String>>,
}

/// Product as it appears in listings: no store id, no description.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProductSummary {
    pub id: String,
    pub category: i64,
    pub name: String,
    pub summary: String,
    pub cost: f64,
    pub currency: String,
    #[serde(rename = "soldCount")]
    pub sold_count: i64,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<String>>,
}

impl From<Product> for ProductSummary {
    fn from(product: Product) -> Self {
        ProductSummary {
            id: product.id,
            category: product.category,
            name: product.name,
            summary: product.summary,
            cost: product.cost,
            currency: product.currency,
            sold_count: product.sold_count,
            images: product.images,
            related: product.related,
        }
    }
}

/// Product detail: no store id, category resolved to its name.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProductInfo {
    pub id: String,
    pub category: String,
    pub name: String,
    pub summary: String,
    pub description: String,
    pub cost: f64,
    pub currency: String,
    #[serde(rename = "soldCount")]
    pub sold_count: i64,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(deserialize_with = "coerce::text")]
    pub product_id: String,
    #[serde(deserialize_with = "coerce::text")]
    pub user: String,
    #[serde(deserialize_with = "coerce::text")]
    pub description: String,
    #[serde(rename = "dateTime", deserialize_with = "coerce::text")]
    pub date_time: String,
    #[serde(deserialize_with = "coerce::number")]
    pub score: f64,
}

/// Comment as returned for a product; the product id is implied by the request.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CommentView {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    pub user: String,
    pub description: String,
    #[serde(rename = "dateTime")]
    pub date_time: String,
    pub score: f64,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        CommentView {
            internal_id: comment.internal_id,
            user: comment.user,
            description: comment.description,
            date_time: comment.date_time,
            score: comment.score,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1))]
    #[serde(deserialize_with = "coerce::text")]
    pub product_id: String,
    #[serde(deserialize_with = "coerce::text")]
    pub user: String,
    #[serde(deserialize_with = "coerce::text")]
    pub description: String,
    #[serde(rename = "dateTime", deserialize_with = "coerce::text")]
    pub date_time: String,
    #[serde(deserialize_with = "coerce::number")]
    pub score: f64,
}

impl NewComment {
    pub fn into_comment(self) -> Comment {
        Comment {
            internal_id: None,
            product_id: self.product_id,
            user: self.user,
            description: self.description,
            date_time: self.date_time,
            score: self.score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewProduct {
    #[serde(deserialize_with = "coerce::integer")]
    pub category: i64,
    #[serde(deserialize_with = "coerce::text")]
    pub name: String,
    #[serde(deserialize_with = "coerce::text")]
    pub summary: String,
    #[serde(deserialize_with = "coerce::text")]
    pub description: String,
    #[serde(deserialize_with = "coerce::number")]
    pub cost: f64,
    #[serde(deserialize_with = "coerce::text")]
    pub currency: String,
    #[serde(default, deserialize_with = "coerce::text_list")]
    pub images: Vec<String>,
}

impl NewProduct {
    /// New products start unsold and without related products.
    pub fn into_product(self, id: String) -> Product {
        Product {
            internal_id: None,
            id,
            category: self.category,
            name: self.name,
            summary: self.summary,
            description: self.description,
            cost: self.cost,
            currency: self.currency,
            sold_count: 0,
            images: self.images,
            related: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemoveCommentRequest {
    #[validate(length(min = 1))]
    #[serde(rename = "_id", deserialize_with = "coerce::text")]
    pub internal_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemoveProductRequest {
    #[validate(length(min = 1))]
    #[serde(deserialize_with = "coerce::text")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub cat: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
}

/// Outcome of an insert: the new identifier, or `false` when none was assigned.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Added {
    Id(String),
    Rejected(bool),
}

impl From<Option<String>> for Added {
    fn from(id: Option<String>) -> Self {
        match id {
            Some(id) if !id.is_empty() => Added::Id(id),
            _ => Added::Rejected(false),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddedResponse {
    pub added: Added,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

/// Deserializers that force loosely typed JSON scalars into declared types.
pub mod coerce {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    fn kind(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn scalar_text(value: Value) -> Result<String, &'static str> {
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(kind(&other)),
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        scalar_text(Value::deserialize(deserializer)?)
            .map_err(|found| D::Error::custom(format!("expected text, found {}", found)))
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let parsed = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|n| n.is_finite())
            .ok_or_else(|| D::Error::custom(format!("expected a number, found {}", kind(&value))))
    }

    pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let as_float = match &value {
            Value::Number(n) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64()),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match as_float {
            Some(n) if n.is_finite() && n.fract() == 0.0 => Ok(n as i64),
            _ => Err(D::Error::custom(format!(
                "expected an integer, found {}",
                kind(&value)
            ))),
        }
    }

    fn collect_text(value: Value, out: &mut Vec<String>) -> Result<(), &'static str> {
        match value {
            Value::Null => Ok(()),
            Value::Array(items) => items
                .into_iter()
                .try_for_each(|item| collect_text(item, out)),
            other => scalar_text(other).map(|s| out.push(s)),
        }
    }

    /// A single scalar or a list of them. Nested lists are flattened and
    /// nulls dropped, which is how older clients wrote `images`.
    pub fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let mut out = Vec::new();
        collect_text(Value::deserialize(deserializer)?, &mut out).map_err(|found| {
            D::Error::custom(format!("expected text or a list of text, found {}", found))
        })?;
        Ok(out)
    }
}
