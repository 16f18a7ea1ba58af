use uuid::Uuid;

use crate::models::category::Category;
use crate::models::transaction::Transaction;
use crate::models::user::User;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resource {
    UserProfile,
    PasswordUpdate,
    EmailChange,
    Category,
    Transaction,
}

/// The authenticated caller, reduced to what the decision functions need.
#[derive(Clone, Copy, Debug)]
pub struct Actor {
    pub id: Uuid,
    pub is_staff: bool,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor {
            id: user.id,
            is_staff: user.is_staff,
        }
    }
}

/// A flattened view of the target object. `owner_id` is the object's own id
/// for user-profile checks.
#[derive(Clone, Copy, Debug)]
pub struct ObjectView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub is_deleted: bool,
    pub is_predefined: bool,
}

impl From<&User> for ObjectView {
    fn from(user: &User) -> Self {
        ObjectView {
            id: user.id,
            owner_id: user.id,
            is_deleted: user.is_deleted,
            is_predefined: false,
        }
    }
}

impl From<&Category> for ObjectView {
    fn from(category: &Category) -> Self {
        ObjectView {
            id: category.id,
            owner_id: category.user_id,
            is_deleted: category.is_deleted,
            is_predefined: category.is_predefined,
        }
    }
}

impl From<&Transaction> for ObjectView {
    fn from(transaction: &Transaction) -> Self {
        ObjectView {
            id: transaction.id,
            owner_id: transaction.user_id,
            is_deleted: transaction.is_deleted,
            is_predefined: false,
        }
    }
}

pub type DecisionFn = fn(&Actor, &ObjectView, Operation) -> bool;

/// Decision functions are looked up per resource kind so the rules stay in
/// one auditable table.
pub fn decision_for(resource: Resource) -> DecisionFn {
    match resource {
        Resource::UserProfile => user_profile_decision,
        Resource::PasswordUpdate => password_update_decision,
        Resource::EmailChange => email_change_decision,
        Resource::Category => category_decision,
        Resource::Transaction => transaction_decision,
    }
}

pub fn is_allowed(
    resource: Resource,
    actor: &Actor,
    object: &ObjectView,
    operation: Operation,
) -> bool {
    decision_for(resource)(actor, object, operation)
}

fn user_profile_decision(actor: &Actor, object: &ObjectView, operation: Operation) -> bool {
    match operation {
        Operation::Read => {
            actor.is_staff || (!object.is_deleted && object.id == actor.id)
        }
        Operation::Write => !object.is_deleted && (actor.is_staff || object.id == actor.id),
    }
}

// Staff may not change another user's password, even with Write access to
// the profile
fn password_update_decision(actor: &Actor, object: &ObjectView, _operation: Operation) -> bool {
    actor.id == object.id
}

fn email_change_decision(actor: &Actor, object: &ObjectView, _operation: Operation) -> bool {
    actor.id == object.id || actor.is_staff
}

fn category_decision(actor: &Actor, object: &ObjectView, operation: Operation) -> bool {
    match operation {
        Operation::Read => {
            if actor.is_staff {
                true
            } else {
                !object.is_deleted && (object.is_predefined || object.owner_id == actor.id)
            }
        }
        Operation::Write => {
            !object.is_deleted && (actor.is_staff || object.owner_id == actor.id)
        }
    }
}

fn transaction_decision(actor: &Actor, object: &ObjectView, operation: Operation) -> bool {
    match operation {
        Operation::Read => {
            actor.is_staff || (!object.is_deleted && object.owner_id == actor.id)
        }
        Operation::Write => {
            !object.is_deleted && (actor.is_staff || object.owner_id == actor.id)
        }
    }
}
