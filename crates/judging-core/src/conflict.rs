//! Conflict-of-interest detection between judges and entrant organisations.
//!
//! Two relationships disqualify a judge:
//!
//! 1. the judge's email domain equals the organisation's website domain
//! 2. the organisation's company name contains the judge's company
//!
//! Both checks are pure and consult nothing beyond the two records.

use std::fmt;

use judging_state::{Judge, Organisation};
use serde::{Deserialize, Serialize};

/// How email and website domains are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainMatching {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

/// Why a judge conflicts with an organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    DomainMatch { domain: String },
    CompanyName { company: String },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::DomainMatch { domain } => write!(f, "shared domain {domain}"),
            ConflictReason::CompanyName { company } => write!(f, "company name contains {company}"),
        }
    }
}

/// Domain part of an email address, after the last `@`.
pub fn email_domain(email: &str) -> Option<&str> {
    let (_, domain) = email.rsplit_once('@')?;
    (!domain.is_empty()).then_some(domain)
}

/// Host part of a website, without scheme, leading `www.` or path.
pub fn website_domain(website: &str) -> Option<&str> {
    let rest = website
        .strip_prefix("https://")
        .or_else(|| website.strip_prefix("http://"))
        .unwrap_or(website);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let host = rest.split('/').next().unwrap_or(rest);
    (!host.is_empty()).then_some(host)
}

fn shared_domain(
    judge: &Judge,
    organisation: &Organisation,
    matching: DomainMatching,
) -> Option<String> {
    let (email, website) = match matching {
        DomainMatching::CaseSensitive => (judge.email.clone(), organisation.website.clone()?),
        DomainMatching::CaseInsensitive => (
            judge.email.to_lowercase(),
            organisation.website.as_deref()?.to_lowercase(),
        ),
    };
    let judge_domain = email_domain(&email)?;
    let org_domain = website_domain(&website)?;
    (judge_domain == org_domain).then(|| org_domain.to_string())
}

/// First conflict found between `judge` and `organisation`, if any.
///
/// The domain check runs before the company-name check.
pub fn detect_conflict(
    judge: &Judge,
    organisation: &Organisation,
    matching: DomainMatching,
) -> Option<ConflictReason> {
    if let Some(domain) = shared_domain(judge, organisation, matching) {
        return Some(ConflictReason::DomainMatch { domain });
    }

    if let Some(company) = judge.company.as_deref() {
        if !company.trim().is_empty()
            && organisation
                .company_name
                .to_lowercase()
                .contains(&company.to_lowercase())
        {
            return Some(ConflictReason::CompanyName {
                company: company.to_string(),
            });
        }
    }

    None
}

/// Whether the judge must be excluded from entries of this organisation.
pub fn has_conflict(judge: &Judge, organisation: &Organisation, matching: DomainMatching) -> bool {
    detect_conflict(judge, organisation, matching).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Organisation {
        Organisation::new("org-1", "Acme Ltd").with_website("https://www.acme.com/about")
    }

    #[test]
    fn strips_scheme_www_and_path() {
        assert_eq!(website_domain("https://www.acme.com/about"), Some("acme.com"));
        assert_eq!(website_domain("http://acme.com"), Some("acme.com"));
        assert_eq!(website_domain("acme.com/"), Some("acme.com"));
        assert_eq!(website_domain("https://"), None);
    }

    #[test]
    fn email_domain_uses_last_at() {
        assert_eq!(email_domain("j1@acme.com"), Some("acme.com"));
        assert_eq!(email_domain("odd@name@acme.com"), Some("acme.com"));
        assert_eq!(email_domain("nobody"), None);
        assert_eq!(email_domain("trailing@"), None);
    }

    #[test]
    fn domain_and_company_conflict() {
        let judge = Judge::new("j1@acme.com", "Jo").with_company("Acme");
        assert_eq!(
            detect_conflict(&judge, &acme(), DomainMatching::CaseSensitive),
            Some(ConflictReason::DomainMatch {
                domain: "acme.com".into()
            })
        );

        let judge = Judge::new("j1@other.org", "Jo").with_company("Acme");
        assert_eq!(
            detect_conflict(&judge, &acme(), DomainMatching::CaseSensitive),
            Some(ConflictReason::CompanyName {
                company: "Acme".into()
            })
        );
    }

    #[test]
    fn no_conflict_without_shared_signals() {
        let judge = Judge::new("j2@other.org", "Sam").with_company("Globex");
        assert!(!has_conflict(&judge, &acme(), DomainMatching::CaseSensitive));
    }

    #[test]
    fn blank_company_never_matches() {
        let judge = Judge::new("j2@other.org", "Sam").with_company("   ");
        assert!(!has_conflict(&judge, &acme(), DomainMatching::CaseSensitive));
    }

    #[test]
    fn missing_website_skips_domain_check() {
        let judge = Judge::new("j1@acme.com", "Jo");
        let org = Organisation::new("org-2", "Acme Ltd");
        assert!(!has_conflict(&judge, &org, DomainMatching::CaseSensitive));
    }

    #[test]
    fn domain_case_follows_matching_mode() {
        let judge = Judge::new("j1@ACME.com", "Jo");
        assert!(!has_conflict(&judge, &acme(), DomainMatching::CaseSensitive));
        assert!(has_conflict(&judge, &acme(), DomainMatching::CaseInsensitive));
    }

    #[test]
    fn case_insensitive_mode_normalises_uppercase_website() {
        let judge = Judge::new("j1@acme.com", "Jo");
        let org = Organisation::new("org-1", "Other Ltd").with_website("HTTPS://WWW.ACME.COM");
        assert!(!has_conflict(&judge, &org, DomainMatching::CaseSensitive));
        assert!(has_conflict(&judge, &org, DomainMatching::CaseInsensitive));
    }

    #[test]
    fn company_containment_ignores_case() {
        let judge = Judge::new("j1@other.org", "Jo").with_company("ACME");
        assert!(has_conflict(&judge, &acme(), DomainMatching::CaseSensitive));
    }
}
