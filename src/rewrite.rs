//! Optional LLM rewriting of article text.
//!
//! The model receives the article as plain text and must answer with JSON
//! `{title, subtitle, excerpt, content}`. A response cut off mid-JSON is
//! asked for once more; any other failure leaves the original text in
//! place. Rewriting never blocks image acquisition.
//!
//! The LLM client is compiled in with the `rewrite` feature only.

use crate::config::PipelineConfig;
use crate::error::RewriteError;
use crate::models::{RawArticle, RewrittenText};
use tracing::warn;

pub trait Rewriter {
    async fn rewrite(&self, article: &RawArticle) -> Result<RewrittenText, RewriteError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Text handed to the model for one article.
pub fn prompt_for(article: &RawArticle) -> String {
    format!(
        "Fuente: {}\nCategoría: {}\nTítulo: {}\n\n{}",
        article.source_name, article.category_hint, article.title, article.excerpt
    )
}

/// Parse a model response, tolerating a surrounding Markdown code fence.
pub fn parse_response(raw: &str) -> Result<RewrittenText, serde_json::Error> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}

/// The rewriter selected at startup.
#[derive(Debug)]
pub enum ConfiguredRewriter {
    Disabled,
    #[cfg(feature = "rewrite")]
    Llm(llm::LlmRewriter),
}

impl ConfiguredRewriter {
    /// Build the rewriter the configuration asks for, degrading to
    /// [`ConfiguredRewriter::Disabled`] with a warning when it cannot.
    pub async fn from_config(config: &PipelineConfig) -> Self {
        if !config.enable_rewrite {
            return ConfiguredRewriter::Disabled;
        }

        #[cfg(feature = "rewrite")]
        let rewriter = match llm::LlmRewriter::load(&config.rewrite_template).await {
            Ok(rewriter) => ConfiguredRewriter::Llm(rewriter),
            Err(e) => {
                warn!(error = %e, "Cannot initialize LLM rewriting; publishing original text");
                ConfiguredRewriter::Disabled
            }
        };

        #[cfg(not(feature = "rewrite"))]
        let rewriter = {
            warn!("{}; publishing original text", RewriteError::Disabled);
            ConfiguredRewriter::Disabled
        };

        rewriter
    }
}

impl Rewriter for ConfiguredRewriter {
    #[cfg_attr(not(feature = "rewrite"), allow(unused_variables))]
    async fn rewrite(&self, article: &RawArticle) -> Result<RewrittenText, RewriteError> {
        match self {
            ConfiguredRewriter::Disabled => Err(RewriteError::Disabled),
            #[cfg(feature = "rewrite")]
            ConfiguredRewriter::Llm(rewriter) => rewriter.rewrite(article).await,
        }
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, ConfiguredRewriter::Disabled)
    }
}

#[cfg(feature = "rewrite")]
pub mod llm {
    use super::{Rewriter, parse_response, prompt_for};
    use crate::error::RewriteError;
    use crate::models::{RawArticle, RewrittenText};
    use crate::retry::Backoff;
    use crate::utils::{looks_truncated, truncate_for_log};
    use awful_aj::api::ask;
    use awful_aj::{config, config_dir, config::AwfulJadeConfig, template, template::ChatTemplate};
    use std::fmt;
    use std::time::{Duration, Instant};
    use tracing::{info, instrument, warn};

    pub struct LlmRewriter {
        config: AwfulJadeConfig,
        template: ChatTemplate,
        backoff: Backoff,
    }

    impl fmt::Debug for LlmRewriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("LlmRewriter")
                .field("backoff", &self.backoff)
                .finish()
        }
    }

    impl LlmRewriter {
        /// Load the chat template and the client configuration from the
        /// client's config directory.
        pub async fn load(template_name: &str) -> Result<Self, RewriteError> {
            let template = template::load_template(template_name)
                .await
                .map_err(|e| RewriteError::Failed(format!("template {template_name}: {e:?}")))?;
            info!(template = template_name, "Loaded template");

            let conf_file = config_dir()
                .map_err(|e| RewriteError::Failed(format!("config dir: {e:?}")))?
                .join("config.yaml");
            let config_path = conf_file.to_string_lossy().to_string();
            let config = config::load_config(&config_path)
                .map_err(|e| RewriteError::Failed(format!("config {config_path}: {e:?}")))?;
            info!(config_path, "Loaded LLM configuration");

            Ok(Self {
                config,
                template,
                backoff: Backoff::new(5, Duration::from_secs(1)),
            })
        }

        #[instrument(level = "info", skip_all)]
        async fn ask_with_backoff(&self, text: &str) -> Result<String, RewriteError> {
            let t0 = Instant::now();
            let res = self
                .backoff
                .retry("llm", |_: &RewriteError| true, || async {
                    ask(&self.config, text.to_string(), &self.template, None, None)
                        .await
                        .map_err(|e| RewriteError::Failed(e.to_string()))
                })
                .await;
            if let Err(e) = &res {
                warn!(elapsed_ms_total = t0.elapsed().as_millis(), error = %e, "LLM call failed");
            }
            res
        }
    }

    impl Rewriter for LlmRewriter {
        #[instrument(level = "info", skip_all, fields(source_url = %article.source_url))]
        async fn rewrite(&self, article: &RawArticle) -> Result<RewrittenText, RewriteError> {
            let prompt = prompt_for(article);
            let response = self.ask_with_backoff(&prompt).await?;
            let mut parsed = parse_response(&response);

            if let Err(e) = &parsed {
                if looks_truncated(e) {
                    warn!(error = %e, "EOF while parsing; re-asking once");
                    let again = self.ask_with_backoff(&prompt).await?;
                    parsed = parse_response(&again);
                }
            }

            parsed.map_err(|e| {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&response, 300),
                    "Model returned non-conforming JSON"
                );
                RewriteError::Malformed(e)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article() -> RawArticle {
        RawArticle {
            title: "El Gobierno anunció cambios en el impuesto a las Ganancias".into(),
            excerpt: "La medida alcanza a trabajadores en relación de dependencia.".into(),
            source_url: "https://www.lanacion.com.ar/politica/nota-nid123/".into(),
            source_name: "La Nación".into(),
            published_at: Utc::now(),
            candidate_image_urls: vec![],
            category_hint: "politica".into(),
        }
    }

    #[test]
    fn test_prompt_carries_article_text() {
        let prompt = prompt_for(&article());
        assert!(prompt.contains("Título: El Gobierno anunció"));
        assert!(prompt.contains("Fuente: La Nación"));
        assert!(prompt.ends_with("relación de dependencia."));
    }

    #[test]
    fn test_parse_response_plain_and_fenced() {
        let plain = r#"{"title":"T","subtitle":"S","excerpt":"E","content":"C"}"#;
        assert_eq!(parse_response(plain).unwrap().subtitle, "S");

        let fenced = format!("```json\n{plain}\n```\n");
        assert_eq!(parse_response(&fenced).unwrap().title, "T");
    }

    #[test]
    fn test_truncated_response_is_detected() {
        let err = parse_response(r#"{"title":"T","excerpt":"E","con"#).unwrap_err();
        assert!(crate::utils::looks_truncated(&err));
    }

    #[tokio::test]
    async fn test_disabled_rewriter() {
        let rewriter = ConfiguredRewriter::Disabled;
        assert!(!rewriter.is_enabled());
        assert!(matches!(rewriter.rewrite(&article()).await, Err(RewriteError::Disabled)));
    }
}
