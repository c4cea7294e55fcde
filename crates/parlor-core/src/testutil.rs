use std::sync::Arc;

use uuid::Uuid;

use parlor_db::Database;

use crate::now_string;

pub(crate) fn test_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().unwrap())
}

pub(crate) fn register_user(db: &Arc<Database>, email: &str) -> Uuid {
    let id = Uuid::new_v4();
    let name = email.split('@').next().unwrap_or(email);
    db.create_user(&id.to_string(), name, email, "hash", &now_string())
        .unwrap();
    id
}
