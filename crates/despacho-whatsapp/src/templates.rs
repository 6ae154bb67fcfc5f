// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only catalog of the approved message templates.
//!
//! Variables are positional: the value for `variables[0]` is bound to
//! position `"1"`, the next to `"2"`, and so on.

use std::collections::HashMap;

use despacho_core::DespachoError;

pub const CONFIRMACION_PEDIDO: &str = "confirmacion_pedido_contraentrega";
pub const PEDIDO_CONFIRMADO: &str = "pedido_confirmado";
pub const MENU_NO_CONFIRMACION: &str = "menu_no_confirmacion";
pub const TIPO_NOVEDAD: &str = "tipo_novedad_pedido";
pub const CONFIRMAR_CANCELACION: &str = "confirmar_cancelacion_pedido";
pub const MOTIVO_CANCELACION: &str = "motivo_cancelacion_pedido";
pub const PEDIDO_CANCELADO: &str = "pedido_cancelado";
pub const NOVEDAD_DIRECCION: &str = "novedad_cambio_direccion";
pub const NOVEDAD_PRODUCTOS: &str = "novedad_cambio_productos";
pub const NOVEDAD_MEDIO_PAGO: &str = "novedad_cambio_medio_pago";
pub const HANDOFF_ASESOR: &str = "handoff_asesor";
pub const ALERTA_SERVIDOR: &str = "alerta_servidor";

/// A pre-approved message shape at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateDefinition {
    pub name: &'static str,
    pub language: &'static str,
    /// Variable names in positional order.
    pub variables: &'static [&'static str],
    pub button_labels: &'static [&'static str],
    pub description: &'static str,
}

const ORDER_ONLY: &[&str] = &["numero_orden"];

pub static CATALOG: [TemplateDefinition; 11] = [
    TemplateDefinition {
        name: CONFIRMACION_PEDIDO,
        language: "es",
        variables: &["nombre", "tienda", "numero_orden", "direccion", "productos"],
        button_labels: &["Confirmar pedido", "No confirmar"],
        description: "Solicita confirmar un pedido contra entrega",
    },
    TemplateDefinition {
        name: PEDIDO_CONFIRMADO,
        language: "es",
        variables: ORDER_ONLY,
        button_labels: &[],
        description: "Confirma que el pedido quedó registrado",
    },
    TemplateDefinition {
        name: MENU_NO_CONFIRMACION,
        language: "es",
        variables: ORDER_ONLY,
        button_labels: &["Presentar novedad", "Cancelar pedido", "Asesor"],
        description: "Opciones cuando el cliente no confirma",
    },
    TemplateDefinition {
        name: TIPO_NOVEDAD,
        language: "es",
        variables: &[],
        button_labels: &[
            "Cambio de dirección",
            "Cambio de productos",
            "Cambio medio de pago",
        ],
        description: "Pregunta el tipo de novedad",
    },
    TemplateDefinition {
        name: CONFIRMAR_CANCELACION,
        language: "es",
        variables: ORDER_ONLY,
        button_labels: &["Sí, cancelar", "No, volver"],
        description: "Pide confirmar la cancelación",
    },
    TemplateDefinition {
        name: MOTIVO_CANCELACION,
        language: "es",
        variables: &[],
        button_labels: &[],
        description: "Pide el motivo de la cancelación en texto libre",
    },
    TemplateDefinition {
        name: PEDIDO_CANCELADO,
        language: "es",
        variables: ORDER_ONLY,
        button_labels: &[],
        description: "Confirma la cancelación del pedido",
    },
    TemplateDefinition {
        name: NOVEDAD_DIRECCION,
        language: "es",
        variables: &[],
        button_labels: &[],
        description: "Novedad registrada: cambio de dirección",
    },
    TemplateDefinition {
        name: NOVEDAD_PRODUCTOS,
        language: "es",
        variables: &[],
        button_labels: &[],
        description: "Novedad registrada: cambio de productos",
    },
    TemplateDefinition {
        name: NOVEDAD_MEDIO_PAGO,
        language: "es",
        variables: &[],
        button_labels: &[],
        description: "Novedad registrada: cambio de medio de pago",
    },
    TemplateDefinition {
        name: HANDOFF_ASESOR,
        language: "es",
        variables: &[],
        button_labels: &[],
        description: "Avisa que un asesor continuará la conversación",
    },
];

/// Platform alert template, sent to the admin phone only.
pub static ALERT_TEMPLATE: TemplateDefinition = TemplateDefinition {
    name: ALERTA_SERVIDOR,
    language: "es",
    variables: &["alert_type", "summary"],
    button_labels: &[],
    description: "Alerta de infraestructura para el administrador",
};

impl TemplateDefinition {
    pub fn has_buttons(&self) -> bool {
        !self.button_labels.is_empty()
    }

    /// Collect the values for positions `"1"..="N"` in order.
    ///
    /// Fails with `MISSING_VARIABLE` naming the first absent position.
    pub fn bind(&self, vars: &HashMap<String, String>) -> Result<Vec<String>, DespachoError> {
        (1..=self.variables.len())
            .map(|position| {
                let key = position.to_string();
                vars.get(&key)
                    .cloned()
                    .ok_or_else(|| DespachoError::MissingVariable {
                        template: self.name.to_string(),
                        position: key,
                    })
            })
            .collect()
    }

    /// Map positional values onto the declared variable names.
    pub fn named_values(&self, values: &[String]) -> Vec<(&'static str, String)> {
        self.variables
            .iter()
            .copied()
            .zip(values.iter().cloned())
            .collect()
    }
}

/// Find a conversation template by name. The alert template is not
/// part of the conversation catalog.
pub fn lookup(name: &str) -> Option<&'static TemplateDefinition> {
    CATALOG.iter().find(|t| t.name == name)
}

pub fn get(name: &str) -> Result<&'static TemplateDefinition, DespachoError> {
    lookup(name).ok_or_else(|| DespachoError::TemplateNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_unique_names() {
        let mut names: Vec<_> = CATALOG.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 11);
        assert!(CATALOG.iter().all(|t| t.language == "es"));
    }

    #[test]
    fn variable_counts_match_catalog() {
        let counts: Vec<(&str, usize)> =
            CATALOG.iter().map(|t| (t.name, t.variables.len())).collect();
        assert!(counts.contains(&(CONFIRMACION_PEDIDO, 5)));
        assert!(counts.contains(&(PEDIDO_CONFIRMADO, 1)));
        assert!(counts.contains(&(MENU_NO_CONFIRMACION, 1)));
        assert!(counts.contains(&(TIPO_NOVEDAD, 0)));
        assert!(counts.contains(&(CONFIRMAR_CANCELACION, 1)));
        assert!(counts.contains(&(MOTIVO_CANCELACION, 0)));
        assert!(counts.contains(&(PEDIDO_CANCELADO, 1)));
        assert!(counts.contains(&(HANDOFF_ASESOR, 0)));
        assert_eq!(ALERT_TEMPLATE.variables.len(), 2);
    }

    #[test]
    fn button_labels_are_exact() {
        let confirm = get(CONFIRMACION_PEDIDO).unwrap();
        assert_eq!(confirm.button_labels, &["Confirmar pedido", "No confirmar"]);
        assert!(confirm.has_buttons());
        assert_eq!(
            get(CONFIRMAR_CANCELACION).unwrap().button_labels,
            &["Sí, cancelar", "No, volver"]
        );
        assert!(!get(PEDIDO_CANCELADO).unwrap().has_buttons());
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert_eq!(get("nope").unwrap_err().code(), "TEMPLATE_NOT_FOUND");
        assert!(lookup(ALERTA_SERVIDOR).is_none());
    }

    #[test]
    fn bind_requires_every_position() {
        let t = get(CONFIRMACION_PEDIDO).unwrap();
        let mut vars: HashMap<String, String> = (1..=4)
            .map(|i| (i.to_string(), format!("v{i}")))
            .collect();
        let err = t.bind(&vars).unwrap_err();
        assert!(
            matches!(err, DespachoError::MissingVariable { ref position, .. } if position == "5")
        );

        vars.insert("5".into(), "v5".into());
        let values = t.bind(&vars).unwrap();
        assert_eq!(values, vec!["v1", "v2", "v3", "v4", "v5"]);
        assert_eq!(t.named_values(&values)[2], ("numero_orden", "v3".to_string()));
    }

    #[test]
    fn zero_variable_templates_bind_to_nothing() {
        let t = get(HANDOFF_ASESOR).unwrap();
        assert!(t.bind(&HashMap::new()).unwrap().is_empty());
    }
}
