//! Stateless field normalizers applied to every CSV value before validation.

use chrono::NaiveDate;

/// Trim and collapse runs of whitespace. Empty input becomes `None`.
pub fn normalize_text(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Lowercase and strip all whitespace, including around `@`.
pub fn normalize_email(value: &str) -> Option<String> {
    let email: String = value
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}

/// Phones keep their formatting; only outer whitespace is removed.
pub fn normalize_phone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a date in ISO `YYYY-MM-DD` or `DD/MM/YYYY` form.
pub fn normalize_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y"))
        .ok()
}

/// Parse a decimal accepting `.` or `,` as the separator.
pub fn normalize_decimal(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok()
}

/// Normalize a product label for alias lookup: lowercase, trim, collapse spaces.
pub fn normalize_product_label(value: &str) -> Option<String> {
    normalize_text(value).map(|t| t.to_lowercase())
}

/// Normalize a foreign column name: lowercase, diacritics stripped, word
/// separators collapsed to underscores.
pub fn normalize_column_name(name: &str) -> String {
    let stripped: String = name.trim().chars().map(strip_diacritic).collect();
    stripped
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '.')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn strip_diacritic(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
        'À' | 'Â' | 'Ä' | 'Á' | 'Ã' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'î' | 'ï' | 'í' => 'i',
        'Î' | 'Ï' | 'Í' => 'I',
        'ô' | 'ö' | 'ó' | 'õ' => 'o',
        'Ô' | 'Ö' | 'Ó' | 'Õ' => 'O',
        'û' | 'ü' | 'ù' | 'ú' => 'u',
        'Û' | 'Ü' | 'Ù' | 'Ú' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_collapses_whitespace() {
        assert_eq!(normalize_text("  Jean   Dupont "), Some("Jean Dupont".to_string()));
        assert_eq!(normalize_text("   "), None);
        assert_eq!(normalize_text(""), None);
    }

    #[test]
    fn email_strips_spaces_around_at() {
        assert_eq!(
            normalize_email("MARIE @ ex.com "),
            Some("marie@ex.com".to_string())
        );
        assert_eq!(normalize_email("  "), None);
    }

    #[test]
    fn date_accepts_both_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(normalize_date("2024-03-15"), Some(expected));
        assert_eq!(normalize_date("15/03/2024"), Some(expected));
        assert_eq!(normalize_date("03-15-2024"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn decimal_accepts_comma_and_dot() {
        assert_eq!(normalize_decimal("12.50"), Some(12.5));
        assert_eq!(normalize_decimal("12,50"), Some(12.5));
        assert_eq!(normalize_decimal("abc"), None);
    }

    #[test]
    fn product_label_is_lowercased_and_collapsed() {
        assert_eq!(
            normalize_product_label("  Riesling   GRAND Cru "),
            Some("riesling grand cru".to_string())
        );
        assert_eq!(normalize_product_label(" "), None);
    }

    #[test]
    fn column_names_lose_diacritics_and_spaces() {
        assert_eq!(normalize_column_name("Libellé Produit"), "libelle_produit");
        assert_eq!(normalize_column_name("Date-Commande"), "date_commande");
        assert_eq!(normalize_column_name("  Qté  "), "qte");
    }
}
