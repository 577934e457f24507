//! Localized API error messages.

/// Messages returned in `{error}` bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Messages {
    pub missing_access_token: &'static str,
    pub invalid_access_token: &'static str,
    pub missing_email_or_password: &'static str,
    pub invalid_email: &'static str,
    pub too_many_requests: &'static str,
    pub server_error: &'static str,
}

pub const EN: Messages = Messages {
    missing_access_token: "Missing access token",
    invalid_access_token: "Access token contains invalid characters",
    missing_email_or_password: "Email and password are required",
    invalid_email: "Invalid email address",
    too_many_requests: "Too many requests, please try again later",
    server_error: "Something went wrong, please try again",
};

pub const PT: Messages = Messages {
    missing_access_token: "Token de acesso ausente",
    invalid_access_token: "O token de acesso contém caracteres inválidos",
    missing_email_or_password: "E-mail e senha são obrigatórios",
    invalid_email: "Endereço de e-mail inválido",
    too_many_requests: "Muitas requisições, tente novamente mais tarde",
    server_error: "Algo deu errado, tente novamente",
};

pub const ES: Messages = Messages {
    missing_access_token: "Falta el token de acceso",
    invalid_access_token: "El token de acceso contiene caracteres no válidos",
    missing_email_or_password: "El correo y la contraseña son obligatorios",
    invalid_email: "Correo electrónico no válido",
    too_many_requests: "Demasiadas solicitudes, inténtalo más tarde",
    server_error: "Algo salió mal, inténtalo de nuevo",
};

/// Dictionary for `locale`, matched on the primary subtag. Unknown locales get English.
#[must_use]
pub fn messages(locale: &str) -> &'static Messages {
    let primary = locale.split(['-', '_']).next().unwrap_or_default();
    match primary.to_ascii_lowercase().as_str() {
        "pt" => &PT,
        "es" => &ES,
        _ => &EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_dictionary_by_primary_subtag() {
        assert_eq!(messages("pt"), &PT);
        assert_eq!(messages("pt-BR"), &PT);
        assert_eq!(messages("ES"), &ES);
        assert_eq!(messages("en-GB"), &EN);
    }

    #[test]
    fn unknown_locale_falls_back_to_english() {
        assert_eq!(messages("fr"), &EN);
        assert_eq!(messages(""), &EN);
        assert_eq!(messages("fr").too_many_requests, EN.too_many_requests);
    }

    #[test]
    fn dictionaries_are_complete() {
        for dict in [&EN, &PT, &ES] {
            for message in [
                dict.missing_access_token,
                dict.invalid_access_token,
                dict.missing_email_or_password,
                dict.invalid_email,
                dict.too_many_requests,
                dict.server_error,
            ] {
                assert!(!message.is_empty());
            }
        }
    }
}
