// =============================================================================
// keywords.rs - READING STATUS AND NATURE OUT OF FREE TEXT
// =============================================================================
//
// Courts describe the same event a dozen ways: "Arquivado Definitivamente",
// "Baixa Definitiva", "arquivamento dos autos". We don't parse any of it, we
// just look for stems.
//
// Every automaton is built once and matches all of its keywords in a single
// pass. Input is lowercased and accent-folded first, so the keyword lists
// can stay plain ASCII and "previdenciário" still hits "previdenci".
// =============================================================================

use aho_corasick::AhoCorasick;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{NatureCategory, ProcessStatus};

/// Lowercase and strip the Portuguese diacritics we actually see.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'º' | 'ª' => '.',
            other => other,
        })
        .collect()
}

/// Checked in this order; the first category with a hit decides.
static ARCHIVED_KEYWORDS: &[&str] = &[
    "arquivad",
    "arquivamento",
    "baixa definitiva",
    "extincao",
    "extinto",
    "cancelad",
];

static APPROVED_KEYWORDS: &[&str] = &[
    "expedicao de precatorio",
    "precatorio expedido",
    "requisicao expedida",
    "expedido oficio requisitorio",
    "expedicao de requisitorio",
    "homologad",
    "deferid",
    "pagamento efetuado",
    "pago",
    "transito em julgado",
    "transitado em julgado",
];

static PENDING_KEYWORDS: &[&str] = &[
    "concluso",
    "aguardando",
    "suspens",
    "pendente",
    "juntada",
    "remessa",
    "vista",
    "prazo",
    "publicad",
];

static ALIMENTARY_KEYWORDS: &[&str] = &[
    "alimentar",
    "alimentos",
    "pensao alimenticia",
    "salario",
    "vencimentos",
    "proventos",
    "remuneracao",
    "servidor publico",
    "indenizacao por morte",
    "invalidez",
];

static TAX_KEYWORDS: &[&str] = &[
    "tribut",
    "execucao fiscal",
    "repeticao de indebito",
    "icms",
    "iptu",
    "ipva",
    "imposto",
    "taxa",
    "contribuicao",
];

static SOCIAL_SECURITY_KEYWORDS: &[&str] = &[
    "previdenci",
    "aposentadoria",
    "inss",
    "auxilio-doenca",
    "auxilio doenca",
    "beneficio assistencial",
    "loas",
    "pensao por morte",
];

static LABOR_KEYWORDS: &[&str] = &[
    "trabalhist",
    "trabalho",
    "reclamacao",
    "verbas rescisorias",
    "fgts",
    "horas extras",
    "clt",
];

fn automaton(keywords: &[&str]) -> AhoCorasick {
    AhoCorasick::new(keywords).expect("static keyword list must build an automaton")
}

static ARCHIVED_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(ARCHIVED_KEYWORDS));
static APPROVED_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(APPROVED_KEYWORDS));
static PENDING_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(PENDING_KEYWORDS));

static ALIMENTARY_AUTOMATON: LazyLock<AhoCorasick> =
    LazyLock::new(|| automaton(ALIMENTARY_KEYWORDS));
static TAX_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(TAX_KEYWORDS));
static SOCIAL_SECURITY_AUTOMATON: LazyLock<AhoCorasick> =
    LazyLock::new(|| automaton(SOCIAL_SECURITY_KEYWORDS));
static LABOR_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(LABOR_KEYWORDS));

/// Derive lifecycle status from the most recent movement text.
///
/// Archived beats Approved beats Pending. A process that was paid and then
/// archived is archived; nobody is buying that credit anymore.
pub fn classify_status(last_movement: Option<&str>) -> ProcessStatus {
    let Some(text) = last_movement.filter(|t| !t.trim().is_empty()) else {
        return ProcessStatus::EarlyReview;
    };
    let folded = fold(text);

    if ARCHIVED_AUTOMATON.is_match(&folded) {
        ProcessStatus::Archived
    } else if APPROVED_AUTOMATON.is_match(&folded) {
        ProcessStatus::Approved
    } else if PENDING_AUTOMATON.is_match(&folded) {
        ProcessStatus::Pending
    } else {
        ProcessStatus::EarlyReview
    }
}

/// Derive the credit's nature from class and subject text.
///
/// Each category counts its hits over the combined text and the highest
/// count wins. Ties go to the category listed first: alimentary, social
/// security, labor, tax. No hits at all is `General`.
pub fn classify_nature(class_name: Option<&str>, subject: Option<&str>) -> NatureCategory {
    let combined = fold(&format!(
        "{} {}",
        class_name.unwrap_or(""),
        subject.unwrap_or("")
    ));

    let scores = [
        (NatureCategory::Alimentary, ALIMENTARY_AUTOMATON.find_iter(&combined).count()),
        (NatureCategory::SocialSecurity, SOCIAL_SECURITY_AUTOMATON.find_iter(&combined).count()),
        (NatureCategory::Labor, LABOR_AUTOMATON.find_iter(&combined).count()),
        (NatureCategory::Tax, TAX_AUTOMATON.find_iter(&combined).count()),
    ];

    let best = scores
        .iter()
        .fold(None::<(NatureCategory, usize)>, |best, &(category, hits)| match best {
            Some((_, top)) if top >= hits => best,
            _ if hits > 0 => Some((category, hits)),
            _ => best,
        });

    let nature = best.map(|(category, _)| category).unwrap_or_default();
    debug!(nature = %nature, text = combined.as_str(), "Nature classified");
    nature
}

/// Quick "is this marker somewhere in the page" check, accent-folded.
pub fn contains_any(haystack_folded: &str, needles_folded: &[&str]) -> bool {
    let bytes = haystack_folded.as_bytes();
    needles_folded
        .iter()
        .any(|needle| memchr::memmem::find(bytes, needle.as_bytes()).is_some())
}
