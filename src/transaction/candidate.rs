//! The schema contract for extracted transactions.
//!
//! Everything that wants to become a [crate::transaction::Transaction] goes
//! through [validate] first: raw model output, human edits to a draft, and the
//! payload of the confirm request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::transaction::Category;

/// The currency assumed when none is given.
pub const DEFAULT_CURRENCY: &str = "UAH";

/// A validated transaction that has not been saved yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    /// How much was spent. Never negative.
    pub amount: f64,
    /// A short currency code such as "UAH" or "EUR".
    pub currency: String,
    /// What the money was spent on.
    pub category: Category,
    /// A short free-text description.
    pub description: Option<String>,
    /// Where the money was spent.
    pub merchant: Option<String>,
}

impl TransactionCandidate {
    /// Create a candidate in the default currency with no description or merchant.
    pub fn new(amount: f64, category: Category) -> Self {
        Self {
            amount,
            currency: DEFAULT_CURRENCY.to_owned(),
            category,
            description: None,
            merchant: None,
        }
    }

    /// Set the currency code.
    pub fn currency(mut self, currency: &str) -> Self {
        currency.clone_into(&mut self.currency);
        self
    }

    /// Set the description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Set the merchant.
    pub fn merchant(mut self, merchant: &str) -> Self {
        self.merchant = Some(merchant.to_owned());
        self
    }

    /// The candidate as a JSON object, the same shape [validate] accepts.
    pub fn to_json(&self) -> Value {
        json!({
            "amount": self.amount,
            "currency": self.currency,
            "category": self.category,
            "description": self.description,
            "merchant": self.merchant,
        })
    }

    /// The JSON Schema handed to the language model as the output constraint.
    pub fn json_schema() -> Value {
        let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();

        json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "Total amount spent, as a positive number"
                },
                "currency": {
                    "type": "string",
                    "description": "Currency code, e.g. UAH, USD, EUR",
                    "default": DEFAULT_CURRENCY
                },
                "category": {
                    "type": "string",
                    "enum": categories,
                    "description": "Spending category"
                },
                "description": {
                    "type": ["string", "null"],
                    "description": "Short description of what was bought"
                },
                "merchant": {
                    "type": ["string", "null"],
                    "description": "Name of the shop or service"
                }
            },
            "required": ["amount", "category"]
        })
    }
}

/// Reasons raw structured data does not describe a transaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The data was not a JSON object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A required field was absent or null.
    #[error("the field \"{0}\" is required")]
    MissingField(&'static str),

    /// A field had the wrong JSON type.
    #[error("the field \"{field}\" must be {expected}")]
    WrongType {
        /// The name of the offending field.
        field: &'static str,
        /// A description of the accepted types.
        expected: &'static str,
    },

    /// The amount was negative, infinite or not a number.
    #[error("the amount must be a finite, non-negative number, got {0}")]
    InvalidAmount(String),

    /// The category was not one of the known categories.
    #[error("\"{0}\" is not one of food, transport, shopping, entertainment, bills, other")]
    InvalidCategory(String),
}

/// Check `raw` against the transaction schema and build a candidate from it.
///
/// Unknown fields are ignored. `currency` falls back to [DEFAULT_CURRENCY] when
/// it is missing, null or blank, and blank `description`/`merchant` values are
/// treated as absent.
///
/// # Errors
/// Returns a [ValidationError] describing the first field that breaks the
/// schema.
pub fn validate(raw: &Value) -> Result<TransactionCandidate, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject(json_type_name(raw)))?;

    let amount = parse_amount(object)?;
    let category = parse_category(object)?;
    let currency = optional_string(object, "currency")?
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());
    let description = optional_string(object, "description")?;
    let merchant = optional_string(object, "merchant")?;

    Ok(TransactionCandidate {
        amount,
        currency,
        category,
        description,
        merchant,
    })
}

fn parse_amount(object: &Map<String, Value>) -> Result<f64, ValidationError> {
    let amount = match object.get("amount") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("amount")),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| ValidationError::InvalidAmount(number.to_string()))?,
        // Models regularly quote numbers, e.g. "85.00".
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidAmount(text.to_owned()))?,
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "amount",
                expected: "a number",
            });
        }
    };

    if !amount.is_finite() || amount < 0.0 {
        return Err(ValidationError::InvalidAmount(amount.to_string()));
    }

    Ok(amount)
}

fn parse_category(object: &Map<String, Value>) -> Result<Category, ValidationError> {
    match object.get("category") {
        None | Some(Value::Null) => Err(ValidationError::MissingField("category")),
        Some(Value::String(text)) => text
            .parse()
            .map_err(|_| ValidationError::InvalidCategory(text.to_owned())),
        Some(_) => Err(ValidationError::WrongType {
            field: "category",
            expected: "a string",
        }),
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => {
            let text = text.trim();

            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(text.to_owned()))
            }
        }
        Some(_) => Err(ValidationError::WrongType {
            field,
            expected: "a string or null",
        }),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::transaction::{Category, TransactionCandidate, ValidationError, validate};

    #[test]
    fn accepts_every_category() {
        for category in Category::ALL {
            let raw = json!({"amount": 10, "category": category.as_str()});

            let candidate = validate(&raw).expect("valid category should pass");

            assert_eq!(candidate.category, category);
        }
    }

    #[test]
    fn rejects_categories_outside_the_closed_set() {
        for category in ["Food", "groceries", "OTHER", "", "food "] {
            let raw = json!({"amount": 10, "category": category});

            assert_eq!(
                validate(&raw),
                Err(ValidationError::InvalidCategory(category.to_owned()))
            );
        }
    }

    #[test]
    fn fills_defaults_for_optional_fields() {
        let raw = json!({"amount": 85, "category": "food"});

        let candidate = validate(&raw).unwrap();

        assert_eq!(candidate, TransactionCandidate::new(85.0, Category::Food));
    }

    #[test]
    fn keeps_all_provided_fields() {
        let raw = json!({
            "amount": 85.5,
            "currency": "EUR",
            "category": "food",
            "description": "Coffee",
            "merchant": "Aroma Kava"
        });

        let candidate = validate(&raw).unwrap();

        assert_eq!(
            candidate,
            TransactionCandidate::new(85.5, Category::Food)
                .currency("EUR")
                .description("Coffee")
                .merchant("Aroma Kava")
        );
    }

    #[test]
    fn ignores_unknown_fields() {
        let raw = json!({"amount": 1, "category": "bills", "confidence": 0.9, "date": "today"});

        assert!(validate(&raw).is_ok());
    }

    #[test]
    fn missing_required_fields_fail() {
        assert_eq!(
            validate(&json!({"category": "food"})),
            Err(ValidationError::MissingField("amount"))
        );
        assert_eq!(
            validate(&json!({"amount": 3})),
            Err(ValidationError::MissingField("category"))
        );
        assert_eq!(
            validate(&json!({"amount": null, "category": "food"})),
            Err(ValidationError::MissingField("amount"))
        );
    }

    #[test]
    fn accepts_numeric_strings_for_amount() {
        let candidate = validate(&json!({"amount": " 85.00 ", "category": "food"})).unwrap();

        assert_eq!(candidate.amount, 85.0);
    }

    #[test]
    fn rejects_non_numeric_and_negative_amounts() {
        assert_eq!(
            validate(&json!({"amount": "eighty", "category": "food"})),
            Err(ValidationError::InvalidAmount("eighty".to_owned()))
        );
        assert_eq!(
            validate(&json!({"amount": -5, "category": "food"})),
            Err(ValidationError::InvalidAmount("-5".to_owned()))
        );
        assert_eq!(
            validate(&json!({"amount": true, "category": "food"})),
            Err(ValidationError::WrongType {
                field: "amount",
                expected: "a number"
            })
        );
    }

    #[test]
    fn blank_optional_strings_are_absent() {
        let raw = json!({
            "amount": 1,
            "category": "other",
            "currency": "  ",
            "merchant": "",
            "description": null
        });

        let candidate = validate(&raw).unwrap();

        assert_eq!(candidate.currency, "UAH");
        assert_eq!(candidate.merchant, None);
        assert_eq!(candidate.description, None);
    }

    #[test]
    fn rejects_non_objects() {
        assert_eq!(
            validate(&json!([1, 2])),
            Err(ValidationError::NotAnObject("an array"))
        );
        assert_eq!(
            validate(&json!("food")),
            Err(ValidationError::NotAnObject("a string"))
        );
    }

    #[test]
    fn candidate_json_validates_back_to_itself() {
        let candidate = TransactionCandidate::new(12.5, Category::Transport).merchant("Uklon");

        assert_eq!(validate(&candidate.to_json()), Ok(candidate));
    }

    #[test]
    fn schema_lists_every_category() {
        let schema = TransactionCandidate::json_schema();

        assert_eq!(
            schema["properties"]["category"]["enum"],
            json!(["food", "transport", "shopping", "entertainment", "bills", "other"])
        );
        assert_eq!(schema["required"], json!(["amount", "category"]));
    }
}
