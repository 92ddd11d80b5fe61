use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level spending/income grouping ("Boende", "Mat", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub id: Option<i64>,
    pub key: String,
    pub display_name: String,
    pub sort_order: i32,
}

/// A spending/income category. System categories are seeded, immutable in
/// name and cannot be hidden, deactivated or deleted; user categories can.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub group_id: i64,
    pub key: String,
    pub display_name: String,
    pub user_display_name: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub is_hidden: bool,
    pub sort_order: i32,
}

#[derive(Debug, Error, PartialEq)]
pub enum CategoryError {
    #[error("System category '{0}' cannot be hidden or deactivated")]
    DisableSystemCategory(String),
    #[error("System category '{0}' cannot be deleted")]
    DeleteSystemCategory(String),
}

impl Category {
    /// Display name shown to the user: their override when set, else the
    /// seeded name.
    pub fn effective_display_name(&self) -> &str {
        self.user_display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.display_name)
    }

    /// Rename. For system categories only the user override moves; the
    /// seeded name is immutable.
    pub fn rename(&mut self, new_name: &str) {
        if self.is_system {
            self.user_display_name = Some(new_name.to_string());
        } else {
            self.display_name = new_name.to_string();
        }
    }

    pub fn set_hidden(&mut self, hidden: bool) -> Result<(), CategoryError> {
        if self.is_system && hidden {
            return Err(CategoryError::DisableSystemCategory(self.key.clone()));
        }
        self.is_hidden = hidden;
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) -> Result<(), CategoryError> {
        if self.is_system && !active {
            return Err(CategoryError::DisableSystemCategory(self.key.clone()));
        }
        self.is_active = active;
        Ok(())
    }

    pub fn can_delete(&self) -> Result<(), CategoryError> {
        if self.is_system {
            return Err(CategoryError::DeleteSystemCategory(self.key.clone()));
        }
        Ok(())
    }
}

/// Seeded groups: (key, display name, sort order).
pub const SEED_GROUPS: &[(&str, &str, i32)] = &[
    ("housing", "Boende", 10),
    ("food", "Mat & Dryck", 20),
    ("transport", "Transport", 30),
    ("household", "Hushåll", 40),
    ("leisure", "Fritid & Nöje", 50),
    ("health", "Hälsa", 60),
    ("savings", "Sparande", 70),
    ("income", "Inkomster", 80),
    ("other", "Övrigt", 90),
];

/// Seeded system categories: (group key, key, display name, sort order).
pub const SEED_CATEGORIES: &[(&str, &str, &str, i32)] = &[
    ("housing", "rent", "Hyra", 10),
    ("housing", "mortgage", "Bolån", 20),
    ("housing", "electricity", "El", 30),
    ("housing", "broadband", "Bredband", 40),
    ("food", "groceries", "Livsmedel", 10),
    ("food", "restaurants", "Restaurang & Café", 20),
    ("transport", "public_transport", "Kollektivtrafik", 10),
    ("transport", "fuel", "Drivmedel", 20),
    ("household", "insurance", "Försäkringar", 10),
    ("household", "subscriptions", "Abonnemang", 20),
    ("leisure", "entertainment", "Nöje", 10),
    ("leisure", "sports", "Sport & Träning", 20),
    ("health", "pharmacy", "Apotek", 10),
    ("health", "care", "Vård", 20),
    ("savings", "savings", "Sparande", 10),
    ("income", "salary", "Lön", 10),
    ("income", "pension", "Pension", 20),
    ("income", "swish_in", "Swish in", 30),
    ("other", "fees", "Avgifter", 10),
    ("other", "uncategorized", "Okategoriserat", 99),
];
