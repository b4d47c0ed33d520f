//! Stock templates for procurement opportunities and legal analyses.

use super::registry::{ChannelContent, NotificationTemplate};
use crate::domain::Channel;

pub const PROCUREMENT_ALERT: &str = "procurement_alert";
pub const LEGAL_ALERT: &str = "legal_alert";

const PROCUREMENT_BODY: &str = "\u{1F3AF} NOVA OPORTUNIDADE DETECTADA

\u{1F4CB} Título: {{title}}
\u{1F3DB}\u{FE0F} Órgão: {{organ}}
\u{1F4DD} Modalidade: {{modality}}
{{#if estimated_value}}\u{1F4B0} Valor Estimado: R$ {{estimated_value}}
{{/if}}\u{1F4C5} Abertura: {{opening_date}}
\u{1F4CD} Região: {{region}}

\u{1F50D} ANÁLISE INTELIGENTE:
{{#if success_probability}}• Probabilidade de Sucesso: {{success_probability}}%
{{/if}}{{#if competition_level}}• Nível de Competição: {{competition_level}}
{{/if}}{{#if strategic_recommendation}}• Recomendação: {{strategic_recommendation}}
{{/if}}
\u{2696}\u{FE0F} VERIFICAÇÃO JURÍDICA NECESSÁRIA
\u{2705} Conferir documentação obrigatória
\u{2705} Validar requisitos de habilitação
\u{2705} Verificar prazos e cronograma
{{#if source_url}}
\u{1F517} Link: {{source_url}}{{/if}}";

const PROCUREMENT_TELEGRAM: &str = "\u{1F3E2} *Nova Oportunidade de Licitação*

*{{title}}*
Órgão: {{organ}}
Modalidade: {{modality}}
{{#if estimated_value}}Valor Estimado: R$ {{estimated_value}}
{{/if}}Abertura: {{opening_date}}
{{#if source_url}}
{{source_url}}
{{/if}}
\u{1F916} _Plataforma de Licitações com IA Jurídica_";

const PROCUREMENT_SHORT: &str =
    "LICITACAO: {{title}} ({{organ}}), abertura {{opening_date}}. Acesse a plataforma para detalhes.";

const LEGAL_BODY: &str = "\u{2696}\u{FE0F} ALERTA JURÍDICO - ANÁLISE COMPLETA

\u{1F4CA} Score de Conformidade: {{compliance_score}}%
{{#if legal_risks}}
\u{1F6A8} RISCOS IDENTIFICADOS:
{{legal_risks}}
{{/if}}{{#if missing_documents}}
\u{1F4CB} DOCUMENTOS FALTANTES:
{{missing_documents}}
{{/if}}{{#if recommendations}}
\u{1F4A1} RECOMENDAÇÕES:
{{recommendations}}
{{/if}}";

const LEGAL_SHORT: &str =
    "ALERTA JURIDICO: conformidade {{compliance_score}}%. Acesse a plataforma para detalhes.";

pub(crate) fn builtin_templates() -> Vec<NotificationTemplate> {
    vec![procurement_alert(), legal_alert()]
}

/// Ids registered by [`crate::templates::TemplateRegistry::with_builtin`].
pub fn ids() -> impl Iterator<Item = &'static str> {
    [PROCUREMENT_ALERT, LEGAL_ALERT].into_iter()
}

/// New opportunity alert.
pub fn procurement_alert() -> NotificationTemplate {
    NotificationTemplate::new(PROCUREMENT_ALERT, "Nova oportunidade de licitação")
        .with_channel(
            Channel::Email,
            ChannelContent::new(PROCUREMENT_BODY)
                .with_subject("Nova Oportunidade de Licitação - {{title}}"),
        )
        .with_channel(Channel::Telegram, ChannelContent::new(PROCUREMENT_TELEGRAM))
        .with_channel(Channel::Sms, ChannelContent::new(PROCUREMENT_SHORT))
        .with_channel(
            Channel::Push,
            ChannelContent::new("{{organ}}: {{title}}").with_subject("Nova oportunidade"),
        )
        .with_default(
            ChannelContent::new(PROCUREMENT_BODY).with_subject("Nova Oportunidade de Licitação"),
        )
        .with_variables([
            "title",
            "organ",
            "modality",
            "estimated_value",
            "opening_date",
            "region",
            "success_probability",
            "competition_level",
            "strategic_recommendation",
            "source_url",
        ])
}

/// Legal compliance analysis alert.
pub fn legal_alert() -> NotificationTemplate {
    NotificationTemplate::new(LEGAL_ALERT, "Alerta jurídico")
        .with_channel(
            Channel::Email,
            ChannelContent::new(LEGAL_BODY).with_subject("Alerta Jurídico - Análise Completa"),
        )
        .with_channel(Channel::Sms, ChannelContent::new(LEGAL_SHORT))
        .with_channel(
            Channel::Push,
            ChannelContent::new("Conformidade {{compliance_score}}%").with_subject("Alerta jurídico"),
        )
        .with_default(ChannelContent::new(LEGAL_BODY))
        .with_variables([
            "compliance_score",
            "legal_risks",
            "missing_documents",
            "recommendations",
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRegistry;
    use serde_json::json;

    #[test]
    fn test_builtin_registered() {
        let registry = TemplateRegistry::with_builtin();
        assert_eq!(registry.list(), vec![LEGAL_ALERT.to_string(), PROCUREMENT_ALERT.to_string()]);
    }

    #[test]
    fn test_procurement_alert_email() {
        let registry = TemplateRegistry::with_builtin();
        let data = json!({
            "title": "Aquisição de notebooks",
            "organ": "Prefeitura de Campinas",
            "modality": "Pregão Eletrônico",
            "estimated_value": "150.000,00",
            "opening_date": "10/06/2026",
            "region": "SP",
            "source_url": "https://example.gov.br/edital/1"
        });
        let rendered = registry.render(PROCUREMENT_ALERT, Channel::Email, &data).unwrap();

        assert_eq!(
            rendered.subject.as_deref(),
            Some("Nova Oportunidade de Licitação - Aquisição de notebooks")
        );
        assert!(rendered.content.contains("Órgão: Prefeitura de Campinas"));
        assert!(rendered.content.contains("Valor Estimado: R$ 150.000,00"));
        assert!(rendered.content.contains("Link: https://example.gov.br/edital/1"));
        // Optional analysis lines absent from the data are dropped.
        assert!(!rendered.content.contains("Probabilidade"));
    }

    #[test]
    fn test_procurement_alert_sms_is_short() {
        let registry = TemplateRegistry::with_builtin();
        let data = json!({"title": "Obra", "organ": "DNIT", "opening_date": "01/07/2026"});
        let rendered = registry.render(PROCUREMENT_ALERT, Channel::Sms, &data).unwrap();
        assert_eq!(
            rendered.content,
            "LICITACAO: Obra (DNIT), abertura 01/07/2026. Acesse a plataforma para detalhes."
        );
    }

    #[test]
    fn test_legal_alert_lists() {
        let registry = TemplateRegistry::with_builtin();
        let data = json!({
            "compliance_score": 72,
            "legal_risks": ["Prazo curto"],
            "recommendations": ["Revisar atestados", "Solicitar esclarecimento"]
        });
        let rendered = registry.render(LEGAL_ALERT, Channel::Email, &data).unwrap();
        assert!(rendered.content.contains("Score de Conformidade: 72%"));
        assert!(rendered.content.contains("Prazo curto"));
        assert!(rendered.content.contains("Revisar atestados, Solicitar esclarecimento"));
        assert!(!rendered.content.contains("DOCUMENTOS FALTANTES"));
    }
}
