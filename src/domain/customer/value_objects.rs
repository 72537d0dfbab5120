use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::order::Actor;
use crate::domain::payment::Payer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Authenticated caller as described by the identity layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub role: Role,
}

impl Customer {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// Staff act on any order; everyone else only on their own
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::Staff => Actor::Staff,
            Role::Customer => Actor::Customer(self.id),
        }
    }

    pub fn to_payer(&self) -> Payer {
        Payer {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone_number: self.phone_number.clone(),
        }
    }
}
