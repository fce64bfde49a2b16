// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::i18n::Locale;
use crate::models::{
    delivery::DeliveryStatus,
    element::ElementStatus,
    rebar::RebarBatchStatus,
};

// Qual entidade não foi encontrada (para a mensagem localizada)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Project,
    Element,
    RebarBatch,
    Delivery,
    Contract,
    Period,
}

impl Resource {
    fn label(self, english: bool) -> &'static str {
        match (self, english) {
            (Resource::User, false) => "Notandi",
            (Resource::Project, false) => "Verkefni",
            (Resource::Element, false) => "Eining",
            (Resource::RebarBatch, false) => "Járnabunki",
            (Resource::Delivery, false) => "Afhending",
            (Resource::Contract, false) => "Samningur",
            (Resource::Period, false) => "Tímabil",
            (Resource::User, true) => "User",
            (Resource::Project, true) => "Project",
            (Resource::Element, true) => "Element",
            (Resource::RebarBatch, true) => "Rebar batch",
            (Resource::Delivery, true) => "Delivery",
            (Resource::Contract, true) => "Contract",
            (Resource::Period, true) => "Period",
        }
    }
}

// O erro da aplicação. O `Display` (via thiserror) vai para os logs;
// a mensagem para o usuário sai de `user_message`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("Acesso negado")]
    Forbidden,

    #[error("Cargo desconhecido: {0}")]
    UnknownRole(String),

    #[error("{0:?} não encontrado")]
    ResourceNotFound(Resource),

    // --- Elementos ---
    #[error("Transição inválida: {from} -> {to}")]
    InvalidStatusTransition { from: ElementStatus, to: ElementStatus },

    #[error("Retrocesso de status exige justificativa")]
    OverrideReasonRequired,

    #[error("Elemento {element_id} com status {status} não pode entrar no lote")]
    ElementNotEligible { element_id: Uuid, status: ElementStatus },

    #[error("Status {0} só é definido pela entrega")]
    StatusSetByDelivery(ElementStatus),

    #[error("Elemento {0} está numa entrega aberta")]
    ElementOnOpenDelivery(Uuid),

    #[error("Elemento {0} já pertence a um lote")]
    ElementAlreadyBatched(Uuid),

    #[error("Elemento {0} é de outro projeto")]
    ElementProjectMismatch(Uuid),

    // --- Lotes de armação ---
    #[error("Elemento não pertence ao lote")]
    ElementNotInBatch,

    #[error("Lote sem elementos")]
    EmptyBatch,

    #[error("Lote não editável (status {0})")]
    BatchNotEditable(RebarBatchStatus),

    #[error("Checklist incompleto: {unchecked} itens pendentes")]
    ChecklistIncomplete { unchecked: usize },

    #[error("Item de checklist desconhecido: {0}")]
    UnknownChecklistItem(String),

    // --- Entregas ---
    #[error("Transição de entrega inválida: {from} -> {to}")]
    InvalidDeliveryTransition { from: DeliveryStatus, to: DeliveryStatus },

    #[error("Entrega não editável (status {0})")]
    DeliveryNotEditable(DeliveryStatus),

    #[error("Entrega ainda não chegou")]
    DeliveryNotArrived,

    #[error("Entrega ainda não está em carregamento")]
    DeliveryNotLoading,

    #[error("Entrega sem elementos")]
    EmptyDelivery,

    #[error("{pending} elementos ainda não carregados")]
    ItemsNotLoaded { pending: usize },

    #[error("{pending} elementos ainda não confirmados")]
    ItemsNotDelivered { pending: usize },

    #[error("Elemento {element_id} com status {status} não está pronto para entrega")]
    ElementNotReady { element_id: Uuid, status: ElementStatus },

    #[error("Elemento {0} já está em outra entrega")]
    ElementAlreadyInDelivery(Uuid),

    #[error("Elemento não pertence à entrega")]
    ElementNotInDelivery,

    #[error("Nome do recebedor ausente")]
    MissingReceiverName,

    #[error("Assinatura ausente")]
    MissingSignature,

    // --- Framvinda ---
    #[error("Período não está em rascunho")]
    PeriodNotDraft,

    #[error("Período não está finalizado")]
    PeriodNotFinalized,

    #[error("Existe período posterior já finalizado")]
    LaterPeriodFinalized,

    #[error("Intervalo de datas inválido")]
    InvalidDateRange,

    #[error("Linha de contrato {0} não pertence ao contrato")]
    UnknownContractLine(Uuid),

    #[error("Valor fora do intervalo numérico")]
    AmountOverflow,

    // --- Infraestrutura ---
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        use AppError::*;
        match self {
            ValidationError(_) | UnknownRole(_) | UnknownChecklistItem(_) | InvalidDateRange
            | OverrideReasonRequired | MissingReceiverName | MissingSignature
            | UnknownContractLine(_) | EmptyBatch | EmptyDelivery | AmountOverflow => {
                StatusCode::BAD_REQUEST
            }
            InvalidCredentials | InvalidToken => StatusCode::UNAUTHORIZED,
            Forbidden => StatusCode::FORBIDDEN,
            ResourceNotFound(_) => StatusCode::NOT_FOUND,
            EmailAlreadyExists
            | InvalidStatusTransition { .. }
            | ElementNotEligible { .. }
            | StatusSetByDelivery(_)
            | ElementOnOpenDelivery(_)
            | ElementAlreadyBatched(_)
            | ElementProjectMismatch(_)
            | ElementNotInBatch
            | BatchNotEditable(_)
            | ChecklistIncomplete { .. }
            | InvalidDeliveryTransition { .. }
            | DeliveryNotEditable(_)
            | DeliveryNotArrived
            | DeliveryNotLoading
            | ItemsNotLoaded { .. }
            | ItemsNotDelivered { .. }
            | ElementNotReady { .. }
            | ElementAlreadyInDelivery(_)
            | ElementNotInDelivery
            | PeriodNotDraft
            | PeriodNotFinalized
            | LaterPeriodFinalized => StatusCode::CONFLICT,
            DatabaseError(_) | InternalServerError(_) | BcryptError(_) | JwtError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Mensagem exibida ao usuário. Islandês por padrão, inglês se pedido.
    pub fn user_message(&self, english: bool) -> String {
        use AppError::*;
        let (is, en): (String, String) = match self {
            ValidationError(_) => (
                "Einn eða fleiri reitir eru ógildir.".into(),
                "One or more fields are invalid.".into(),
            ),
            InvalidCredentials => (
                "Rangt netfang eða lykilorð.".into(),
                "Invalid e-mail or password.".into(),
            ),
            InvalidToken => (
                "Auðkenning vantar eða er ógild.".into(),
                "Authentication token is missing or invalid.".into(),
            ),
            EmailAlreadyExists => (
                "Netfangið er þegar í notkun.".into(),
                "This e-mail is already in use.".into(),
            ),
            Forbidden => (
                "Þú hefur ekki heimild til þessarar aðgerðar.".into(),
                "You are not allowed to perform this action.".into(),
            ),
            UnknownRole(role) => (
                format!("Óþekkt hlutverk: {role}"),
                format!("Unknown role: {role}"),
            ),
            ResourceNotFound(resource) => (
                format!("{} fannst ekki.", resource.label(false)),
                format!("{} not found.", resource.label(true)),
            ),
            InvalidStatusTransition { from, to } => (
                format!("Ekki er hægt að breyta stöðu úr {} í {}.", from.label_is(), to.label_is()),
                format!("Cannot change status from {from} to {to}."),
            ),
            OverrideReasonRequired => (
                "Skrá þarf ástæðu þegar staða er færð til baka.".into(),
                "A reason is required to move a status backwards.".into(),
            ),
            ElementNotEligible { status, .. } => (
                format!("Eining í stöðu {} getur ekki verið í járnabunka.", status.label_is()),
                format!("An element with status {status} cannot be in a rebar batch."),
            ),
            StatusSetByDelivery(status) => (
                format!("Staðan {} er aðeins sett í gegnum afhendingu.", status.label_is()),
                format!("Status {status} is only set through a delivery."),
            ),
            ElementOnOpenDelivery(_) => (
                "Einingin er í opinni afhendingu. Breyttu stöðunni í gegnum afhendinguna.".into(),
                "The element is on an open delivery. Change its status through the delivery.".into(),
            ),
            ElementAlreadyBatched(_) => (
                "Einingin er þegar í járnabunka.".into(),
                "The element already belongs to a rebar batch.".into(),
            ),
            ElementProjectMismatch(_) => (
                "Einingin tilheyrir öðru verkefni.".into(),
                "The element belongs to another project.".into(),
            ),
            ElementNotInBatch => (
                "Einingin er ekki í þessum bunka.".into(),
                "The element is not in this batch.".into(),
            ),
            EmptyBatch => (
                "Bunkinn inniheldur engar einingar.".into(),
                "The batch has no elements.".into(),
            ),
            BatchNotEditable(status) => (
                format!("Ekki er hægt að breyta bunka í stöðu {}.", status.label_is()),
                format!("A batch with status {status} cannot be changed."),
            ),
            ChecklistIncomplete { unchecked } => (
                format!("Gátlisti er ekki kláraður ({unchecked} atriði eftir)."),
                format!("Checklist is incomplete ({unchecked} items left)."),
            ),
            UnknownChecklistItem(key) => (
                format!("Óþekkt atriði á gátlista: {key}"),
                format!("Unknown checklist item: {key}"),
            ),
            InvalidDeliveryTransition { from, to } => (
                format!("Ekki er hægt að færa afhendingu úr {} í {}.", from.label_is(), to.label_is()),
                format!("Cannot move delivery from {from} to {to}."),
            ),
            DeliveryNotEditable(status) => (
                format!("Ekki er hægt að breyta afhendingu í stöðu {}.", status.label_is()),
                format!("A delivery with status {status} cannot be changed."),
            ),
            DeliveryNotArrived => (
                "Merkja þarf komu á áfangastað fyrst.".into(),
                "You must mark arrival first.".into(),
            ),
            DeliveryNotLoading => (
                "Hefja þarf hleðslu fyrst.".into(),
                "You must start loading first.".into(),
            ),
            EmptyDelivery => (
                "Afhendingin inniheldur engar einingar.".into(),
                "The delivery has no elements.".into(),
            ),
            ItemsNotLoaded { pending } => (
                format!("{pending} einingar eru ekki komnar á bílinn."),
                format!("{pending} elements are not loaded yet."),
            ),
            ItemsNotDelivered { pending } => (
                format!("Staðfesta þarf afhendingu {pending} eininga."),
                format!("{pending} elements are not confirmed delivered."),
            ),
            ElementNotReady { status, .. } => (
                format!("Eining í stöðu {} er ekki tilbúin til afhendingar.", status.label_is()),
                format!("An element with status {status} is not ready for delivery."),
            ),
            ElementAlreadyInDelivery(_) => (
                "Einingin er þegar í annarri afhendingu.".into(),
                "The element is already in another delivery.".into(),
            ),
            ElementNotInDelivery => (
                "Einingin er ekki í þessari afhendingu.".into(),
                "The element is not in this delivery.".into(),
            ),
            MissingReceiverName => (
                "Nafn móttakanda vantar.".into(),
                "Receiver name is required.".into(),
            ),
            MissingSignature => (
                "Undirskrift vantar.".into(),
                "A signature is required.".into(),
            ),
            PeriodNotDraft => (
                "Tímabilið er lokað og ekki hægt að breyta því.".into(),
                "The period is finalized and cannot be changed.".into(),
            ),
            PeriodNotFinalized => (
                "Tímabilið er ekki lokað.".into(),
                "The period is not finalized.".into(),
            ),
            LaterPeriodFinalized => (
                "Seinna tímabil hefur þegar verið lokað.".into(),
                "A later period has already been finalized.".into(),
            ),
            InvalidDateRange => (
                "Lokadagur má ekki vera á undan upphafsdegi.".into(),
                "The end date cannot be before the start date.".into(),
            ),
            UnknownContractLine(_) => (
                "Samningslína tilheyrir ekki samningnum.".into(),
                "The contract line does not belong to the contract.".into(),
            ),
            AmountOverflow => (
                "Magn eða upphæð er of há.".into(),
                "The quantity or amount is too large.".into(),
            ),
            DatabaseError(_) | InternalServerError(_) | BcryptError(_) | JwtError(_) => (
                "Óvænt villa kom upp. Reyndu aftur.".into(),
                "An unexpected error occurred. Please try again.".into(),
            ),
        };
        if english { en } else { is }
    }

    // Converte para a resposta HTTP no idioma do cliente
    pub fn to_api_error(&self, locale: &Locale) -> ApiError {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Erro Interno do Servidor: {}", self);
        } else {
            tracing::debug!("Ação rejeitada: {}", self);
        }

        let details = match self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            _ => None,
        };

        ApiError {
            status,
            error: self.user_message(locale.is_english()),
            details,
        }
    }
}

// O lado "falha" do resultado discriminado {success, error}
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "success": false, "error": self.error, "details": details }),
            None => json!({ "success": false, "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

// Usado pelos middlewares, que não têm o Locale à mão
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn precondition_errors_map_to_conflict() {
        assert_eq!(
            AppError::ChecklistIncomplete { unchecked: 3 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::DeliveryNotArrived.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::PeriodNotDraft.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::ResourceNotFound(Resource::Element).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::MissingSignature.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn delivery_rejection_does_not_mention_batches() {
        let err = AppError::ElementNotReady {
            element_id: Uuid::new_v4(),
            status: ElementStatus::Cast,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(!err.user_message(true).contains("batch"));
        assert!(!err.user_message(false).contains("járnabunka"));
        assert_eq!(AppError::AmountOverflow.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn messages_default_to_icelandic() {
        let err = AppError::DeliveryNotArrived;
        assert_eq!(err.user_message(false), "Merkja þarf komu á áfangastað fyrst.");
        assert_eq!(err.user_message(true), "You must mark arrival first.");
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        let err = AppError::InternalServerError(anyhow::anyhow!("connection reset by peer"));
        let message = err.user_message(false);
        assert!(!message.contains("connection"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn failure_body_is_discriminated() {
        let response = AppError::ChecklistIncomplete { unchecked: 2 }.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Gátlisti er ekki kláraður (2 atriði eftir)."));
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn localized_failure_body() {
        let locale = Locale("en".to_string());
        let response = AppError::MissingReceiverName.to_api_error(&locale).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], json!("Receiver name is required."));
    }
}
