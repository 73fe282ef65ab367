use log::{info, warn};
use serde::{Deserialize, Serialize};
use tauri::State;

use crate::store::{self, IDENTITY_KEY};
use crate::AppState;

/// The cached identity is the sole authority for "is a user logged in".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub position: String,
    #[serde(rename = "isHr")]
    pub is_hr: bool,
}

#[tauri::command]
pub async fn login(
    username: String,
    password: String,
    state: State<'_, AppState>,
) -> Result<Identity, String> {
    if username.trim().is_empty() || password.trim().is_empty() {
        return Err("Пожалуйста, введите имя пользователя и пароль".to_string());
    }

    info!("🔐 Logging in user '{}'", username);
    let response = state
        .api
        .login(&username, &password)
        .await
        .map_err(|e| e.to_string())?;

    let identity = Identity {
        id: response.user_id,
        name: response.name.unwrap_or_else(|| "Иван Иванов".to_string()),
        position: response.position,
        is_hr: response.is_hr.unwrap_or(false),
    };

    {
        let mut store = state.store.lock();
        if let Err(e) = store::set_typed(store.as_mut(), IDENTITY_KEY, &identity) {
            warn!("Failed to cache identity: {}", e);
        }
    }
    *state.session.lock() = Some(identity.clone());

    info!("✅ Logged in: {} ({})", identity.name, identity.position);
    Ok(identity)
}

#[tauri::command]
pub fn logout(state: State<'_, AppState>) -> Result<(), String> {
    info!("👋 Logging out");
    state.session.lock().take();
    let mut store = state.store.lock();
    store
        .remove(IDENTITY_KEY)
        .map_err(|e| format!("Не удалось удалить сохранённые данные входа: {}", e))
}

/// Restores the persisted identity on startup, if any.
#[tauri::command]
pub fn current_user(state: State<'_, AppState>) -> Option<Identity> {
    if let Some(identity) = state.session.lock().clone() {
        return Some(identity);
    }

    let cached: Option<Identity> = {
        let store = state.store.lock();
        store::get_typed(store.as_ref(), IDENTITY_KEY)
    };
    if let Some(identity) = cached.clone() {
        info!("🔓 Restored session for {}", identity.name);
        *state.session.lock() = Some(identity);
    }
    cached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ResultStore};

    #[test]
    fn test_identity_cache_wire_shape() {
        let identity = Identity {
            id: 3,
            name: "Мария Петрова".to_string(),
            position: "Менеджер".to_string(),
            is_hr: true,
        };

        let mut store = MemoryStore::new();
        store::set_typed(&mut store, IDENTITY_KEY, &identity).unwrap();

        let raw = store.get_raw(IDENTITY_KEY).unwrap();
        assert_eq!(raw["isHr"], true);
        assert_eq!(raw["id"], 3);

        let restored: Identity = store::get_typed(&store, IDENTITY_KEY).unwrap();
        assert_eq!(restored.name, identity.name);
        assert!(restored.is_hr);
    }
}
