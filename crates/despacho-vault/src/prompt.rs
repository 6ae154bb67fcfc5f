// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase acquisition from `DESPACHO_VAULT_KEY` or an interactive prompt.

use despacho_core::DespachoError;
use secrecy::SecretString;

pub const VAULT_KEY_ENV_VAR: &str = "DESPACHO_VAULT_KEY";

/// Replacement passphrase for `vault change-passphrase` when not prompting.
pub const NEW_VAULT_KEY_ENV_VAR: &str = "DESPACHO_VAULT_NEW_KEY";

fn env_key(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|key| !key.is_empty())
        .map(SecretString::from)
}

fn from_env() -> Option<SecretString> {
    env_key(VAULT_KEY_ENV_VAR)
}

fn read(prompt: &str) -> Result<String, DespachoError> {
    eprint!("{prompt}");
    rpassword::read_password()
        .map_err(|e| DespachoError::Vault(format!("failed to read passphrase: {e}")))
}

fn no_passphrase() -> DespachoError {
    DespachoError::Vault(format!(
        "no passphrase provided; set {VAULT_KEY_ENV_VAR} or run interactively"
    ))
}

/// The env var wins (systemd, containers); otherwise prompt on a TTY.
pub fn get_vault_passphrase() -> Result<SecretString, DespachoError> {
    if let Some(key) = from_env() {
        return Ok(key);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(no_passphrase());
    }
    let passphrase = read("Vault passphrase: ")?;
    if passphrase.is_empty() {
        return Err(DespachoError::Vault("empty passphrase not allowed".to_string()));
    }
    Ok(SecretString::from(passphrase))
}

/// Like [`get_vault_passphrase`], but a prompted passphrase must be typed twice.
pub fn get_vault_passphrase_with_confirm() -> Result<SecretString, DespachoError> {
    if let Some(key) = from_env() {
        return Ok(key);
    }
    prompt_confirmed()
}

/// The passphrase replacing the current one: `DESPACHO_VAULT_NEW_KEY`, or a
/// confirmed TTY prompt. `DESPACHO_VAULT_KEY` is never reused here.
pub fn get_new_vault_passphrase() -> Result<SecretString, DespachoError> {
    if let Some(key) = env_key(NEW_VAULT_KEY_ENV_VAR) {
        return Ok(key);
    }
    prompt_confirmed()
}

fn prompt_confirmed() -> Result<SecretString, DespachoError> {
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(no_passphrase());
    }
    let first = read("New vault passphrase: ")?;
    let second = read("Confirm vault passphrase: ")?;
    if first != second {
        return Err(DespachoError::Vault("passphrases do not match".to_string()));
    }
    if first.is_empty() {
        return Err(DespachoError::Vault("empty passphrase not allowed".to_string()));
    }
    Ok(SecretString::from(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_var_supplies_passphrase() {
        // SAFETY: test-only env mutation, serialized with the other env tests.
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "desde-env") };
        let plain = get_vault_passphrase();
        let confirmed = get_vault_passphrase_with_confirm();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };
        assert_eq!(plain.unwrap().expose_secret(), "desde-env");
        assert_eq!(confirmed.unwrap().expose_secret(), "desde-env");
    }

    #[test]
    #[serial]
    fn empty_env_var_is_ignored() {
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "") };
        // stdin is not a terminal under the test harness.
        let result = get_vault_passphrase();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn new_passphrase_ignores_current_key() {
        unsafe {
            std::env::set_var(VAULT_KEY_ENV_VAR, "actual");
            std::env::set_var(NEW_VAULT_KEY_ENV_VAR, "siguiente");
        }
        let replacement = get_new_vault_passphrase();
        unsafe { std::env::remove_var(NEW_VAULT_KEY_ENV_VAR) };
        let without_new = get_new_vault_passphrase();
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };

        assert_eq!(replacement.unwrap().expose_secret(), "siguiente");
        // Falls through to the prompt, which needs a terminal.
        assert!(without_new.is_err());
    }
}
