use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr};

pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Event derive does not support generic types",
        ));
    }

    let ident = &input.ident;
    let event_name = extract_name(input)?;
    let timestamp_field = extract_timestamp_field(input)?;

    Ok(quote! {
        impl ::routed_events::Event for #ident {
            fn name(&self) -> &str {
                <Self as ::routed_events::TypedEvent>::NAME
            }

            fn occurred_at(&self) -> ::routed_events::__private::DateTime<::routed_events::__private::Utc> {
                self.#timestamp_field
            }

            fn encode_body(
                &self,
            ) -> ::core::result::Result<
                ::std::boxed::Box<::routed_events::__private::RawValue>,
                ::routed_events::__private::serde_json::Error,
            > {
                ::routed_events::__private::serde_json::value::to_raw_value(self)
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }
        }

        impl ::routed_events::TypedEvent for #ident {
            const NAME: &'static str = #event_name;
        }
    })
}

fn extract_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("event") {
            continue;
        }

        let mut name = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported event attribute, expected `name = \"...\"`"))
            }
        })?;

        if let Some(name) = name {
            if name.is_empty() {
                return Err(syn::Error::new_spanned(attr, "event name must not be empty"));
            }
            return Ok(name);
        }
    }

    Ok(to_dotted_case(&input.ident.to_string()))
}

fn extract_timestamp_field(input: &DeriveInput) -> syn::Result<Ident> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Event derive requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Event derive only supports structs",
            ))
        }
    };

    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("event") {
                continue;
            }
            let mut is_timestamp = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("timestamp") {
                    is_timestamp = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported field attribute, expected `timestamp`"))
                }
            })?;
            if is_timestamp {
                if let Some(ident) = &field.ident {
                    return Ok(ident.clone());
                }
            }
        }
    }

    fields
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .find(|ident| *ident == "occurred_at")
        .cloned()
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                "Event derive: no field marked with #[event(timestamp)] and no field named `occurred_at`",
            )
        })
}

fn to_dotted_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('.');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
