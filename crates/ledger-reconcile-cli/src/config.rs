use anyhow::{Context, Result};
use ledger_reconcile::reconcile::candidates::{MatchSettings, RankingPolicy};
use ledger_reconcile::reconcile::matching::MergeTemplate;
use ledger_reconcile::review::{ReviewOptions, Tokens};
use ledger_reconcile::store::Separator;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ranking {
    #[default]
    FewestRecordsFirst,
    ClosestDateFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigMatching {
    pub max_group_size: usize,
    pub ranking: Ranking,
    pub auto_match: bool,
    pub max_search_nodes: usize,
}

impl Default for ConfigMatching {
    fn default() -> Self {
        let settings = MatchSettings::default();
        ConfigMatching {
            max_group_size: settings.max_group_size,
            ranking: Ranking::default(),
            auto_match: false,
            max_search_nodes: settings.max_search_nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigReview {
    pub skip: String,
    pub undo: String,
    pub exit: String,
    pub max_attempts: usize,
}

impl Default for ConfigReview {
    fn default() -> Self {
        let options = ReviewOptions::default();
        ConfigReview {
            skip: options.tokens.skip,
            undo: options.tokens.undo,
            exit: options.tokens.exit,
            max_attempts: options.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigFormat {
    pub default_separator: char,
    pub loading_separator: char,
    pub currency_symbol: String,
    pub merge_label: String,
}

impl Default for ConfigFormat {
    fn default() -> Self {
        let template = MergeTemplate::default();
        ConfigFormat {
            default_separator: Separator::COMMA.as_char(),
            loading_separator: Separator::CARET.as_char(),
            currency_symbol: template.currency_symbol,
            merge_label: template.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigCard {
    pub name: String,
    /// Text identifying card direct debits in the bank-out ledger.
    pub direct_debit_description: String,
    pub payment_description: String,
    pub balance_code: String,
}

impl Default for ConfigCard {
    fn default() -> Self {
        ConfigCard {
            name: "Card".to_owned(),
            direct_debit_description: "CARD DIRECT DEBIT".to_owned(),
            payment_description: "Card payment".to_owned(),
            balance_code: "card-bal".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Directory holding statements, ledger and working files, relative to
    /// the config file.
    pub main_path: PathBuf,
    pub matching: ConfigMatching,
    pub review: ConfigReview,
    pub format: ConfigFormat,
    pub card: ConfigCard,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            main_path: PathBuf::from("."),
            matching: ConfigMatching::default(),
            review: ConfigReview::default(),
            format: ConfigFormat::default(),
            card: ConfigCard::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<(PathBuf, Self)> {
        let base_dir = path.parent().map(ToOwned::to_owned).unwrap_or_default();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok((base_dir, config))
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.matching.max_group_size >= 1,
            "matching.max_group_size must be at least 1"
        );
        anyhow::ensure!(
            self.review.max_attempts >= 1,
            "review.max_attempts must be at least 1"
        );
        Ok(())
    }

    pub fn find_and_load() -> Result<Option<(PathBuf, Self)>> {
        let config_locations = [
            Path::new("ledger-reconcile.toml"),
            Path::new(".ledger-reconcile.toml"),
        ];

        for location in &config_locations {
            if location.exists() {
                return Self::load_from_file(location).map(Some);
            }
        }

        Ok(None)
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            max_group_size: self.matching.max_group_size,
            ranking: match self.matching.ranking {
                Ranking::FewestRecordsFirst => RankingPolicy::FewestRecordsFirst,
                Ranking::ClosestDateFirst => RankingPolicy::ClosestDateFirst,
            },
            max_search_nodes: self.matching.max_search_nodes,
        }
    }

    pub fn merge_template(&self) -> MergeTemplate {
        MergeTemplate {
            label: self.format.merge_label.clone(),
            currency_symbol: self.format.currency_symbol.clone(),
        }
    }

    pub fn review_options(&self) -> ReviewOptions {
        ReviewOptions {
            tokens: Tokens {
                skip: self.review.skip.clone(),
                undo: self.review.undo.clone(),
                exit: self.review.exit.clone(),
            },
            max_attempts: self.review.max_attempts,
            currency_symbol: self.format.currency_symbol.clone(),
        }
    }

    /// The separator of files as delivered, and the one used while loading.
    pub fn separators(&self) -> Result<(Separator, Separator)> {
        let default = Separator::try_from(self.format.default_separator)
            .context("Invalid format.default_separator")?;
        let loading = Separator::try_from(self.format.loading_separator)
            .context("Invalid format.loading_separator")?;
        Ok((default, loading))
    }
}
