//! English inflection used to derive table names, foreign keys and
//! join-table names from model names. Deliberately simple - irregular nouns
//! outside the lookup table need explicit configuration on the model.

const IRREGULARS: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("foot", "feet"),
    ("tooth", "teeth"),
];

/// Pluralize a singular word: `bookmark` -> `bookmarks`, `category` -> `categories`.
pub fn pluralize(name: &str) -> String {
    for (singular, plural) in IRREGULARS {
        if name == *singular {
            return (*plural).to_string();
        }
    }
    if name.ends_with('y') && !ends_with_vowel_y(name) {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s')
        || name.ends_with("sh")
        || name.ends_with("ch")
        || name.ends_with('x')
        || name.ends_with('z')
    {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

/// Singularize a plural word: `bookmarks` -> `bookmark`, `categories` -> `category`.
pub fn singularize(name: &str) -> String {
    for (singular, plural) in IRREGULARS {
        if name == *plural {
            return (*singular).to_string();
        }
    }
    if name.ends_with("ies") {
        format!("{}y", &name[..name.len() - 3])
    } else if name.ends_with("ses")
        || name.ends_with("shes")
        || name.ends_with("ches")
        || name.ends_with("xes")
        || name.ends_with("zes")
    {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && name.len() > 1 {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

fn ends_with_vowel_y(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    matches!(bytes[bytes.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u')
}

/// Convert `CamelCase` (or `camelCase`) to `snake_case`.
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Convert `snake_case` to `PascalCase`.
pub fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for part in name.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars);
        }
    }
    out
}

/// Conventional table name for a model: `ContactTask` -> `contact_tasks`.
pub fn table_name(model: &str) -> String {
    pluralize(&underscore(model))
}

/// Conventional foreign key for a model: `ContactTask` -> `contact_task_id`.
pub fn foreign_key(model: &str) -> String {
    format!("{}_id", underscore(model))
}
