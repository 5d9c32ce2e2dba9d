use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn is_system(&self) -> bool {
        return *self == Role::System;
    }
}
