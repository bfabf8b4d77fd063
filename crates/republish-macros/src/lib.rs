//! Procedural macros for Republish observable objects.
//!
//! This crate provides `#[derive(Observable)]`, which implements
//! `republish_core::Observable` for a struct and generates accessors for its
//! observable fields.
//!
//! # Attributes
//!
//! ## `#[change_signal]`
//!
//! Marks the struct's `ChangeSignal`. Exactly one field must carry it.
//!
//! ## `#[published]` and `#[republished]`
//!
//! Mark `Published<T>` and `Republished<V>` fields. Each gets a getter named
//! after the field and a `set_<field>` setter. Both bind the field to the
//! change signal before touching it, so fields built with `new` still notify
//! the owner:
//!
//! ```ignore
//! #[derive(Observable)]
//! struct Screen {
//!     #[change_signal]
//!     changed: ChangeSignal,
//!
//!     #[published]
//!     title: Published<String>,
//!
//!     #[republished(read_only)]
//!     counter: Republished<Arc<Counter>>,
//! }
//! ```
//!
//! Field attributes:
//! - `read_only`: No setter is generated
//!
//! ## `#[dependency]`
//!
//! Marks a `Dependency<K>` field. The getter resolves the dependency for this
//! object:
//!
//! ```ignore
//! #[dependency]
//! clock: Dependency<ClockKey>,
//! ```
//!
//! ## `#[observable]`
//!
//! Struct-level configuration:
//!
//! ```ignore
//! #[derive(Observable)]
//! #[observable(no_accessors)]  // Only implement the trait
//! struct Model {
//!     // ...
//! }
//! ```
//!
//! Generated code names items through `::republish_core`. Crates that only
//! depend on the `republish` umbrella point the derive at it instead:
//!
//! ```ignore
//! #[derive(Observable)]
//! #[observable(crate = "republish")]
//! struct Model {
//!     // ...
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Field, Fields, GenericArgument, Ident,
    PathArguments, Type, Visibility,
};

/// Derive the `Observable` trait and generate field accessors.
///
/// # Example
///
/// ```ignore
/// use republish::prelude::*;
///
/// #[derive(Observable)]
/// struct Counter {
///     #[change_signal]
///     changed: ChangeSignal,
///
///     #[published]
///     value: Published<i32>,
/// }
///
/// let counter = Counter { changed: ChangeSignal::new(), value: Published::new(0) };
/// counter.set_value(counter.value() + 1);
/// ```
#[proc_macro_derive(Observable, attributes(observable, change_signal, published, republished, dependency))]
pub fn derive_observable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_observable(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Published,
    Republished,
    Dependency,
}

impl FieldKind {
    fn attr_name(self) -> &'static str {
        match self {
            FieldKind::Published => "published",
            FieldKind::Republished => "republished",
            FieldKind::Dependency => "dependency",
        }
    }

    fn wrapper_name(self) -> &'static str {
        match self {
            FieldKind::Published => "Published",
            FieldKind::Republished => "Republished",
            FieldKind::Dependency => "Dependency",
        }
    }
}

/// Parsed observable field information.
struct FieldInfo {
    name: Ident,
    vis: Visibility,
    kind: FieldKind,
    inner_type: Type,
    read_only: bool,
}

/// Parsed struct-level `#[observable(...)]` attributes.
struct ObservableAttrs {
    no_accessors: bool,
    krate: syn::Path,
}

fn impl_derive_observable(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let attrs = parse_observable_attrs(&input.attrs)?;
    let krate = &attrs.krate;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Observable derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Observable derive only supports structs",
            ))
        }
    };

    let mut signal_field: Option<&Ident> = None;
    let mut observable_fields = Vec::new();

    for field in fields.iter() {
        if has_attr(&field.attrs, "change_signal") {
            if signal_field.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field may be marked #[change_signal]",
                ));
            }
            signal_field = field.ident.as_ref();
        }
        if let Some(info) = parse_observable_field(field)? {
            observable_fields.push(info);
        }
    }

    let Some(signal_field) = signal_field else {
        return Err(syn::Error::new_spanned(
            input,
            "Observable derive requires a field marked #[change_signal]",
        ));
    };

    let accessors = if attrs.no_accessors {
        quote! {}
    } else {
        let fns = observable_fields
            .iter()
            .map(|info| generate_accessors(krate, signal_field, info));
        let bindings = observable_fields
            .iter()
            .filter(|info| info.kind != FieldKind::Dependency)
            .map(|info| {
                let name = &info.name;
                quote! { self.#name.bind_forwarding(&self.#signal_field); }
            });

        quote! {
            impl #impl_generics #struct_name #ty_generics #where_clause {
                /// Bind every published and republished field to this
                /// object's change signal (generated by #[derive(Observable)]).
                ///
                /// Fields already bound to an owner keep it.
                pub fn bind_observable_fields(&self) {
                    #(#bindings)*
                }

                #(#fns)*
            }
        }
    };

    let expanded = quote! {
        impl #impl_generics #krate::Observable for #struct_name #ty_generics #where_clause {
            fn change_signal(&self) -> &#krate::ChangeSignal {
                &self.#signal_field
            }
        }

        #accessors
    };

    Ok(expanded)
}

/// Parse struct-level #[observable(...)] attributes.
fn parse_observable_attrs(attrs: &[Attribute]) -> syn::Result<ObservableAttrs> {
    let mut result = ObservableAttrs {
        no_accessors: false,
        krate: syn::parse_quote!(::republish_core),
    };

    for attr in attrs {
        if !attr.path().is_ident("observable") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("no_accessors") {
                result.no_accessors = true;
                Ok(())
            } else if meta.path.is_ident("crate") {
                let path: syn::LitStr = meta.value()?.parse()?;
                result.krate = path.parse()?;
                Ok(())
            } else {
                Err(meta.error("unknown observable attribute"))
            }
        })?;
    }

    Ok(result)
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Parse a field marked #[published], #[republished] or #[dependency].
fn parse_observable_field(field: &Field) -> syn::Result<Option<FieldInfo>> {
    let Some(name) = field.ident.clone() else {
        return Ok(None);
    };

    let mut found: Option<(FieldKind, &Attribute)> = None;
    for kind in [
        FieldKind::Published,
        FieldKind::Republished,
        FieldKind::Dependency,
    ] {
        if let Some(attr) = field
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident(kind.attr_name()))
        {
            if found.is_some() {
                return Err(syn::Error::new_spanned(
                    attr,
                    "a field can carry only one of #[published], #[republished] and #[dependency]",
                ));
            }
            found = Some((kind, attr));
        }
    }

    let Some((kind, attr)) = found else {
        return Ok(None);
    };

    // `#[published]` has no arguments to parse.
    let mut read_only = false;
    if !matches!(attr.meta, syn::Meta::Path(_)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("read_only") && kind != FieldKind::Dependency {
                read_only = true;
                Ok(())
            } else {
                Err(meta.error(format!("unknown {} attribute", kind.attr_name())))
            }
        })?;
    }

    let inner_type = extract_inner_type(&field.ty, kind.wrapper_name()).ok_or_else(|| {
        syn::Error::new_spanned(
            &field.ty,
            format!(
                "#[{}] fields must have type `{}<_>`",
                kind.attr_name(),
                kind.wrapper_name()
            ),
        )
    })?;

    Ok(Some(FieldInfo {
        name,
        vis: field.vis.clone(),
        kind,
        inner_type,
        read_only,
    }))
}

/// Extract `T` from `Wrapper<T>`.
fn extract_inner_type(ty: &Type, wrapper: &str) -> Option<Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner.clone()),
        _ => None,
    }
}

/// Generate the getter and setter for one field.
fn generate_accessors(krate: &syn::Path, signal_field: &Ident, info: &FieldInfo) -> TokenStream2 {
    let name = &info.name;
    let vis = &info.vis;
    let inner_type = &info.inner_type;

    if info.kind == FieldKind::Dependency {
        return quote! {
            #vis fn #name(&self) -> <#inner_type as #krate::DependencyKey>::Value {
                self.#name.get(self)
            }
        };
    }

    let getter = quote! {
        #vis fn #name(&self) -> #inner_type {
            self.#name.bind_forwarding(&self.#signal_field);
            self.#name.get()
        }
    };

    let setter = if info.read_only {
        quote! {}
    } else {
        let setter_name = format_ident!("set_{}", name);
        quote! {
            #vis fn #setter_name(&self, value: #inner_type) {
                self.#name.bind_forwarding(&self.#signal_field);
                self.#name.set(value);
            }
        }
    };

    quote! {
        #getter
        #setter
    }
}
