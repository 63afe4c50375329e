//! Citizen notifications and the French messages written on each event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{
  payment::{NewPayment, to_major},
  request::{NewBirthCertificate, RequestHeader},
  status::{NotificationStatus, RequestStatus},
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
  StatusUpdate,
  CertificateReady,
  PaymentReceived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id: Uuid,
  pub citizen_id:      Uuid,
  pub title:           String,
  pub message:         String,
  pub kind:            NotificationKind,
  pub status:          NotificationStatus,
  /// The request that triggered the notification.
  pub reference_id:    Option<Uuid>,
  pub created_at:      DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
  pub citizen_id:   Uuid,
  pub title:        String,
  pub message:      String,
  pub kind:         NotificationKind,
  pub reference_id: Option<Uuid>,
}

// ─── Message composition ─────────────────────────────────────────────────────

/// Notification for a status change on `header`.
pub fn status_changed(
  header: &RequestHeader,
  new_status: RequestStatus,
  comment: Option<&str>,
) -> NewNotification {
  let title = match new_status {
    RequestStatus::Pending => "Demande remise en attente",
    RequestStatus::Completed => "Demande approuvée",
    RequestStatus::Rejected => "Demande rejetée",
  };

  let mut message = format!(
    "Votre demande {} a été {}.",
    header.kind.with_de(),
    new_status.label_fr()
  );
  if let Some(c) = comment.map(str::trim).filter(|c| !c.is_empty()) {
    let prefix = if new_status == RequestStatus::Rejected {
      "Motif"
    } else {
      "Commentaire"
    };
    message.push_str(&format!(" {prefix} : {c}"));
  }

  NewNotification {
    citizen_id: header.citizen_id,
    title: title.to_owned(),
    message,
    kind: NotificationKind::StatusUpdate,
    reference_id: Some(header.request_id),
  }
}

/// Notification announcing a freshly issued certificate.
pub fn certificate_ready(
  certificate_id: Uuid,
  certificate: &NewBirthCertificate,
) -> NewNotification {
  let number = certificate
    .certificate_number
    .as_deref()
    .unwrap_or("en cours d'attribution");
  NewNotification {
    citizen_id:   certificate.citizen_id,
    title:        "Acte de naissance disponible".to_owned(),
    message:      format!(
      "L'acte de naissance de {} (n° {number}) est disponible. \
       Numéro de suivi : {}.",
      certificate.full_name, certificate.tracking_number
    ),
    kind:         NotificationKind::CertificateReady,
    reference_id: Some(certificate_id),
  }
}

/// Notification confirming a recorded payment.
pub fn payment_received(citizen_id: Uuid, payment: &NewPayment) -> NewNotification {
  NewNotification {
    citizen_id,
    title: "Paiement reçu".to_owned(),
    message: format!(
      "Votre paiement de {} {} a bien été enregistré.",
      to_major(payment.amount_minor),
      payment.currency.to_uppercase()
    ),
    kind: NotificationKind::PaymentReceived,
    reference_id: Some(payment.target.request_id()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::RequestKind;

  fn header() -> RequestHeader {
    let now = Utc::now();
    RequestHeader {
      kind:       RequestKind::BirthCertificate,
      request_id: Uuid::new_v4(),
      citizen_id: Uuid::new_v4(),
      agent_id:   None,
      status:     RequestStatus::Pending,
      comment:    None,
      version:    0,
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn rejection_message_carries_reason() {
    let h = header();
    let n = status_changed(&h, RequestStatus::Rejected, Some("pièce illisible"));
    assert_eq!(n.citizen_id, h.citizen_id);
    assert_eq!(n.reference_id, Some(h.request_id));
    assert!(n.message.contains("rejetée"), "{}", n.message);
    assert!(n.message.contains("Motif : pièce illisible"), "{}", n.message);
  }

  #[test]
  fn approval_message_without_comment() {
    let n = status_changed(&header(), RequestStatus::Completed, None);
    assert_eq!(n.message, "Votre demande d'acte de naissance a été approuvée.");
  }

  #[test]
  fn payment_message_uses_major_units() {
    let payment = NewPayment {
      target:              crate::payment::PaymentTarget::BirthDeclaration(Uuid::new_v4()),
      amount_minor:        500_000,
      currency:            "xof".into(),
      status:              crate::status::PaymentStatus::Paid,
      checkout_session_id: "cs_test".into(),
    };
    let n = payment_received(Uuid::new_v4(), &payment);
    assert!(n.message.contains("5000 XOF"), "{}", n.message);
    assert_eq!(n.kind, NotificationKind::PaymentReceived);
  }
}
