use telar_core::config::{BusinessConfig, LlmConfig};
use telar_core::domain::conversation::{Conversation, MessageOrigin, QualField};

/// Builds the instruction block and the per-turn input sent to the
/// inference provider: static business facts, behavioral rules, the current
/// field snapshot, and a bounded window of recent messages.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    business_name: String,
    facts: String,
    history_window: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub instructions: String,
    pub input: String,
}

impl PromptBuilder {
    pub fn new(business: &BusinessConfig, llm: &LlmConfig) -> Self {
        Self {
            business_name: business.name.clone(),
            facts: business.facts.clone(),
            history_window: llm.history_window,
        }
    }

    pub fn build(&self, conversation: &Conversation, inbound: &str) -> Prompt {
        Prompt {
            instructions: self.instructions(),
            input: self.input(conversation, inbound),
        }
    }

    fn instructions(&self) -> String {
        format!(
            "Sos el asistente de WhatsApp de {name}. Atendés consultas de clientes \
             en español rioplatense, con tono cordial y breve.\n\
             Datos del negocio: {facts}\n\
             Tu objetivo es reunir estos datos del cliente: nombre, zona, qué \
             necesita (resumen de intención) y, si pide una visita, su \
             disponibilidad horaria. Preguntá de a un dato por mensaje, nunca \
             más de uno. No inventes precios ni promociones.\n\
             Respondé SIEMPRE con exactamente un objeto JSON y nada más, con \
             estas claves: \"reply\" (string, tu respuesta al cliente), y \
             opcionalmente \"name\", \"zone\", \"intentSummary\", \
             \"availability\" (strings con datos que el cliente haya dado en \
             este mensaje) y \"handoff_intent\" (\"none\", \"price\" si pide \
             presupuesto o \"visit\" si pide coordinar una visita).",
            name = self.business_name,
            facts = self.facts,
        )
    }

    fn input(&self, conversation: &Conversation, inbound: &str) -> String {
        let mut out = String::from("Datos ya confirmados:\n");
        for field in QualField::PRIORITY {
            out.push_str(&format!(
                "- {}: {}\n",
                field.label(),
                conversation.field(field).unwrap_or("(pendiente)")
            ));
        }

        out.push_str("\nÚltimos mensajes:\n");
        let skip = conversation.messages.len().saturating_sub(self.history_window);
        for message in conversation.messages.iter().skip(skip) {
            let who = match message.origin {
                MessageOrigin::Customer => "cliente",
                MessageOrigin::Assistant => "asistente",
                MessageOrigin::System => continue,
            };
            out.push_str(&format!("{who}: {}\n", message.text));
        }

        out.push_str(&format!("\nMensaje nuevo del cliente: {inbound}\n"));
        out
    }
}
