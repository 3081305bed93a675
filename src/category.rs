use serde::{Deserialize, Serialize};

/// Predefined food filters shown as a horizontal strip above the results.
///
/// The canonical value doubles as the display label and as the query text
/// submitted when the category is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FoodCategory {
    Chicken,
    Beef,
    Soup,
    Dessert,
    Vegetarian,
    Milk,
    Vegan,
    Pizza,
    Donut,
}

impl FoodCategory {
    const ALL: [Self; 9] = [
        Self::Chicken,
        Self::Beef,
        Self::Soup,
        Self::Dessert,
        Self::Vegetarian,
        Self::Milk,
        Self::Vegan,
        Self::Pizza,
        Self::Donut,
    ];

    pub fn all() -> &'static [Self] {
        &Self::ALL
    }

    pub fn value(self) -> &'static str {
        match self {
            Self::Chicken => "Chicken",
            Self::Beef => "Beef",
            Self::Soup => "Soup",
            Self::Dessert => "Dessert",
            Self::Vegetarian => "Vegetarian",
            Self::Milk => "Milk",
            Self::Vegan => "Vegan",
            Self::Pizza => "Pizza",
            Self::Donut => "Donut",
        }
    }

    pub fn from_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.value() == value)
    }
}

impl std::fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

impl TryFrom<String> for FoodCategory {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_value(&value).ok_or_else(|| format!("unknown food category: {value}"))
    }
}

impl From<FoodCategory> for String {
    fn from(category: FoodCategory) -> Self {
        category.value().to_string()
    }
}
