//! Derive macros for the Turnstile registration engine.
//!
//! Action enums in Turnstile unify *commands* (requests to change the state
//! of one event's registration domain) and *events* (immutable facts that
//! already happened and are persisted to the event stream). The
//! `#[derive(Action)]` macro generates the small amount of reflection the
//! runtime and the event wire format need to tell the two apart.
//!
//! # Example
//!
//! ```ignore
//! use turnstile_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum RegistrationAction {
//!     #[command]
//!     Cancel { registration_id: RegistrationId },
//!
//!     #[event]
//!     RegistrationCancelled { registration_id: RegistrationId },
//! }
//!
//! // Generated methods:
//! // action.is_command(), action.is_event(), action.event_type()
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, parse_macro_input};

/// Derive macro for action enums.
///
/// Generates helper methods for enums whose variants are annotated with
/// `#[command]` or `#[event]`:
///
/// - `is_command()` — true for `#[command]` variants
/// - `is_event()` — true for `#[event]` variants
/// - `event_type()` — stable type name (`"VariantName.v1"`) used when the
///   variant is serialized into the event stream; commands return
///   `"unknown"` since they are never persisted
///
/// # Panics
///
/// Produces a compile error (not a runtime panic) if applied to a non-enum
/// type, or if a variant carries both `#[command]` and `#[event]`.
#[proc_macro_derive(Action, attributes(command, event))]
#[allow(clippy::expect_used)] // Proc macro panics become compile errors, not runtime panics
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut command_variants = Vec::new();
    let mut event_variants = Vec::new();

    for variant in &data_enum.variants {
        let variant_name = &variant.ident;
        let is_command = has_attribute(&variant.attrs, "command");
        let is_event = has_attribute(&variant.attrs, "event");

        if is_command && is_event {
            return syn::Error::new_spanned(
                variant,
                "Variant cannot be both #[command] and #[event]",
            )
            .to_compile_error()
            .into();
        }

        if is_command {
            command_variants.push(variant_name);
        }

        if is_event {
            event_variants.push(variant_name);
        }
    }

    let variant_map: std::collections::HashMap<_, _> = data_enum
        .variants
        .iter()
        .map(|v| (&v.ident, &v.fields))
        .collect();

    let is_command_arms = command_variants.iter().map(|variant| {
        let fields = variant_map.get(variant).expect("variant must exist in map");
        match fields {
            Fields::Named(_) => quote! { Self::#variant { .. } => true, },
            Fields::Unnamed(_) => quote! { Self::#variant(..) => true, },
            Fields::Unit => quote! { Self::#variant => true, },
        }
    });

    let is_event_arms = event_variants.iter().map(|variant| {
        let fields = variant_map.get(variant).expect("variant must exist in map");
        match fields {
            Fields::Named(_) => quote! { Self::#variant { .. } => true, },
            Fields::Unnamed(_) => quote! { Self::#variant(..) => true, },
            Fields::Unit => quote! { Self::#variant => true, },
        }
    });

    let event_type_arms = event_variants.iter().map(|variant| {
        let type_name = format!("{variant}.v1");
        let fields = variant_map.get(variant).expect("variant must exist in map");
        match fields {
            Fields::Named(_) => quote! { Self::#variant { .. } => #type_name, },
            Fields::Unnamed(_) => quote! { Self::#variant(..) => #type_name, },
            Fields::Unit => quote! { Self::#variant => #type_name, },
        }
    });

    let expanded = quote! {
        impl #name {
            /// Returns true if this action is a command
            #[must_use]
            pub const fn is_command(&self) -> bool {
                match self {
                    #(#is_command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            pub const fn is_event(&self) -> bool {
                match self {
                    #(#is_event_arms)*
                    _ => false,
                }
            }

            /// Returns the event type name for serialization
            ///
            /// Only events have type names. Commands return "unknown".
            #[must_use]
            pub const fn event_type(&self) -> &'static str {
                match self {
                    #(#event_type_arms)*
                    _ => "unknown",
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}
