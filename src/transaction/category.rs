//! The closed set of spending categories a transaction can belong to.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// What a transaction was spent on.
///
/// Stored in the database and sent over the wire as its lowercase string
/// value, e.g. `"food"`, never as an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Groceries, cafes and restaurants.
    Food,
    /// Public transport, taxis and fuel.
    Transport,
    /// Clothes, electronics and other goods.
    Shopping,
    /// Cinema, concerts, games and subscriptions.
    Entertainment,
    /// Utilities, rent, phone and internet.
    Bills,
    /// Anything that does not fit the other categories.
    Other,
}

impl Category {
    /// Every category, in the order they are presented to the model and users.
    pub const ALL: [Category; 6] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Other,
    ];

    /// The canonical string value of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Bills => "bills",
            Category::Other => "other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The string did not name one of the known categories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid category")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Parse a category from its exact, lowercase string value.
    ///
    /// Matching is case-sensitive: `"Food"` and `" food"` are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

impl rusqlite::ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl rusqlite::types::FromSql for Category {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| rusqlite::types::FromSqlError::Other(Box::new(error)))
    }
}
