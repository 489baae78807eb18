//! Login field heuristics
//!
//! Locates email, password and submit controls on an arbitrary login screen
//! using only textual attributes and vertical layout. Nothing here errors
//! for "not found": every field is optional in the result, and the caller
//! decides what an absent field means.

use crate::config::LoginTuning;
use crate::hierarchy::UiNode;
use crate::resolver::smallest_enclosing_clickable;
use serde::Serialize;
use tracing::debug;

/// Case-insensitive keyword tables. Matching is substring-based, so terms
/// that are substrings of common unrelated words (e.g. "go", "ok") are
/// deliberately absent.
static PASSWORD_KEYWORDS: &[&str] = &[
    "password", "passwort", "contraseña", "contrasena", "senha", "mot de passe", "wachtwoord",
    "пароль", "密码", "密碼", "パスワード", "비밀번호", "passcode", "pwd",
];

static EMAIL_KEYWORDS: &[&str] = &[
    "email", "e-mail", "mail", "correo", "courriel", "почта", "邮箱", "郵箱", "メール", "이메일",
    "username", "user name", "benutzername", "identifiant", "usuario", "utilisateur", "用户名",
    "账号", "帳號", "account",
];

static SUBMIT_KEYWORDS: &[&str] = &[
    "log in", "login", "sign in", "signin", "submit", "continue", "next", "done", "anmelden",
    "einloggen", "se connecter", "connexion", "iniciar sesión", "iniciar sesion", "entrar",
    "acceder", "войти", "вход", "登录", "登入", "サインイン", "ログイン", "로그인", "확인",
];

/// Detected login controls as indices into the snapshot's node list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoginFields {
    pub email_field: Option<usize>,
    pub password_field: Option<usize>,
    pub submit_button: Option<usize>,
}

fn haystack(node: &UiNode) -> String {
    format!("{} {} {}", node.text, node.resource_id, node.content_desc).to_lowercase()
}

/// Sum of matched keyword lengths; longer, more specific terms dominate
fn keyword_score(node: &UiNode, keywords: &[&str]) -> u32 {
    let hay = haystack(node);
    keywords
        .iter()
        .filter(|kw| hay.contains(*kw))
        .map(|kw| kw.chars().count() as u32)
        .sum()
}

fn best_scored(candidates: &[usize], nodes: &[UiNode], keywords: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .map(|&i| (i, keyword_score(&nodes[i], keywords)))
        .filter(|(_, score)| *score > 0)
        .max_by_key(|(_, score)| *score)
        .map(|(i, _)| i)
}

fn y1_of(node: &UiNode) -> i32 {
    node.bounds.map(|b| b.y1).unwrap_or(i32::MAX)
}

/// Classify login controls within one snapshot's node list.
pub fn detect_login_fields(nodes: &[UiNode], tuning: &LoginTuning) -> LoginFields {
    // Text-input-capable nodes top-to-bottom; unbounded inputs sink to the
    // end, stable within equal rows
    let mut inputs: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].is_text_input()).collect();
    inputs.sort_by_key(|&i| y1_of(&nodes[i]));

    let password_field = detect_password(&inputs, nodes);
    let email_field = detect_email(&inputs, nodes, password_field);
    let (email_field, password_field) = disambiguate(&inputs, nodes, email_field, password_field);
    let submit_button = detect_submit(nodes, password_field, tuning);

    debug!(
        ?email_field,
        ?password_field,
        ?submit_button,
        "login fields classified"
    );

    LoginFields {
        email_field,
        password_field,
        submit_button,
    }
}

fn detect_password(inputs: &[usize], nodes: &[UiNode]) -> Option<usize> {
    // Explicit flag wins outright
    if let Some(&i) = inputs.iter().find(|&&i| nodes[i].password) {
        return Some(i);
    }

    if let Some(i) = best_scored(inputs, nodes, PASSWORD_KEYWORDS) {
        return Some(i);
    }

    // A keyworded non-input (label beside an unflagged field) still beats
    // blind position
    let all: Vec<usize> = (0..nodes.len()).collect();
    if let Some(i) = best_scored(&all, nodes, PASSWORD_KEYWORDS) {
        return Some(i);
    }

    // Convention: with several inputs the password box sits lowest
    if inputs.len() >= 2 {
        return inputs.last().copied();
    }

    None
}

fn detect_email(inputs: &[usize], nodes: &[UiNode], password: Option<usize>) -> Option<usize> {
    if let Some(i) = best_scored(inputs, nodes, EMAIL_KEYWORDS) {
        return Some(i);
    }

    inputs.iter().find(|&&i| Some(i) != password).copied()
}

/// Resolve the two candidates landing on the same control, and enforce the
/// email-above-password layout convention
fn disambiguate(
    inputs: &[usize],
    nodes: &[UiNode],
    email: Option<usize>,
    password: Option<usize>,
) -> (Option<usize>, Option<usize>) {
    let (Some(e), Some(p)) = (email, password) else {
        return (email, password);
    };

    let coincide = e == p
        || (nodes[e].bounds.is_some() && nodes[e].bounds == nodes[p].bounds);
    if coincide && inputs.len() >= 2 {
        return (inputs.first().copied(), inputs.last().copied());
    }

    // Vertical position is decisive: "email" below "password" means the
    // keyword match got them backwards
    if let (Some(eb), Some(pb)) = (nodes[e].bounds, nodes[p].bounds) {
        if eb.y1 > pb.y1 {
            return (Some(p), Some(e));
        }
    }

    (Some(e), Some(p))
}

fn is_button_like(node: &UiNode) -> bool {
    node.clickable
        && (node.class_name.contains("Button")
            || !node.text.is_empty()
            || !node.content_desc.is_empty())
}

fn detect_submit(nodes: &[UiNode], password: Option<usize>, tuning: &LoginTuning) -> Option<usize> {
    // The search region hangs off the password field's bottom edge; without
    // a located password there is no region to search
    let password_bottom = nodes[password?].bounds?.y2;
    let floor = password_bottom - tuning.submit_y_tolerance_px;

    let region: Vec<usize> = (0..nodes.len())
        .filter(|&i| !nodes[i].is_text_input())
        .filter(|&i| nodes[i].bounds.map(|b| b.y1 >= floor).unwrap_or(false))
        .collect();

    // Keyword path: a labeled control in the region, lifted onto its
    // clickable container when the label itself is inert
    if let Some(label) = best_scored(&region, nodes, SUBMIT_KEYWORDS) {
        if nodes[label].clickable {
            return Some(label);
        }
        if let Some(container) = smallest_enclosing_clickable(label, nodes) {
            return Some(container);
        }
        return Some(label);
    }

    // Size path: the largest button-like element below the password field,
    // accepted only with clear area dominance over the runner-up
    let mut sized: Vec<(usize, i64)> = region
        .iter()
        .filter(|&&i| is_button_like(&nodes[i]))
        .filter_map(|&i| nodes[i].bounds.map(|b| (i, b.area())))
        .collect();
    sized.sort_by(|a, b| b.1.cmp(&a.1));

    match sized.as_slice() {
        [] => None,
        [(only, _)] => Some(*only),
        [(top, top_area), (_, runner_up), ..] => {
            if *top_area as f64 >= tuning.submit_area_margin * *runner_up as f64 {
                Some(*top)
            } else {
                // Too close to call; a wrong submit tap is worse than none
                None
            }
        }
    }
}
