//! Procedural macros for the `objects` object model
//!
//! Provides:
//! - `#[interface("iid")]` - Declare a capability interface (vtable struct + view struct)
//! - `#[object(IFoo, IBar)]` - Declare a payload type and the interfaces it implements
//! - `#[implement(IFoo)]` - Implement one interface for a payload type
//!
//! Every generated vtable embeds `objects::IObjectVTable` as its first field, so
//! acquire/release/query work through any interface pointer.
//!
//! All vtable entries use the `C` calling convention with `this` as the first
//! parameter.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream, Parser};
use syn::punctuated::Punctuated;
use syn::{
    FnArg, Ident, ImplItem, ItemImpl, ItemStruct, ItemTrait, LitStr, Pat, Token, TraitItem, Type,
    parse_macro_input, spanned::Spanned,
};

// =============================================================================
// Validation
// =============================================================================

/// Why `ty` cannot cross a vtable, if it obviously cannot
fn non_ffi_reason(ty: &Type) -> Option<&'static str> {
    match ty {
        Type::Reference(_) => Some("references cannot cross a vtable, pass a raw pointer"),
        Type::Slice(_) | Type::TraitObject(_) | Type::ImplTrait(_) => {
            Some("unsized or opaque types cannot cross a vtable")
        }
        Type::Tuple(tuple) if !tuple.elems.is_empty() => {
            Some("tuples have no C layout, use a #[repr(C)] struct")
        }
        Type::Path(type_path) => match type_path.path.segments.last()?.ident.to_string().as_str() {
            "String" | "Vec" | "Box" | "Rc" | "Arc" => {
                Some("owned Rust containers cannot cross a vtable, pass a pointer or an interface")
            }
            _ => None,
        },
        _ => None,
    }
}

/// Validate a method signature (shared by trait and impl methods)
fn validate_signature(sig: &syn::Signature) -> Result<(), syn::Error> {
    let method_name = &sig.ident;
    let span = method_name.span();

    if sig.asyncness.is_some() {
        return Err(syn::Error::new(
            span,
            format!(
                "method '{}': async functions are not supported in interfaces",
                method_name
            ),
        ));
    }

    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            span,
            format!(
                "method '{}': generic methods are not supported in interfaces",
                method_name
            ),
        ));
    }

    // Receiver must be &self or &mut self
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() => {}
        Some(FnArg::Receiver(receiver)) => {
            return Err(syn::Error::new(
                receiver.self_token.span(),
                format!(
                    "method '{}': self by value is not supported. Use &self or &mut self instead",
                    method_name
                ),
            ));
        }
        _ => {
            return Err(syn::Error::new(
                span,
                format!(
                    "method '{}': must have &self or &mut self parameter",
                    method_name
                ),
            ));
        }
    }

    for arg in sig.inputs.iter().skip(1) {
        if let FnArg::Typed(pat_type) = arg {
            if !matches!(pat_type.pat.as_ref(), Pat::Ident(_)) {
                return Err(syn::Error::new(
                    pat_type.pat.span(),
                    format!(
                        "method '{}': parameters must be plain identifiers",
                        method_name
                    ),
                ));
            }
            if let Some(reason) = non_ffi_reason(&pat_type.ty) {
                return Err(syn::Error::new(
                    pat_type.ty.span(),
                    format!("method '{}': {}", method_name, reason),
                ));
            }
        }
    }

    if let syn::ReturnType::Type(_, ty) = &sig.output
        && let Some(reason) = non_ffi_reason(ty)
    {
        return Err(syn::Error::new(
            ty.span(),
            format!("method '{}': return type: {}", method_name, reason),
        ));
    }

    Ok(())
}

/// Validate a trait definition
fn validate_trait(input: &ItemTrait) -> Result<(), syn::Error> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "generic interfaces are not supported",
        ));
    }

    for item in &input.items {
        match item {
            TraitItem::Fn(method) => {
                if method.default.is_some() {
                    return Err(syn::Error::new(
                        method.sig.ident.span(),
                        format!(
                            "method '{}': interface methods cannot have a default body",
                            method.sig.ident
                        ),
                    ));
                }
                validate_signature(&method.sig)?;
            }
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "interfaces may only contain methods",
                ));
            }
        }
    }

    Ok(())
}

/// Validate an impl block
fn validate_impl(input: &ItemImpl) -> Result<(), syn::Error> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "generic impl blocks are not supported",
        ));
    }

    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[implement] expects an inherent impl block",
        ));
    }

    for item in &input.items {
        if let ImplItem::Fn(method) = item {
            validate_signature(&method.sig)?;
        }
    }

    Ok(())
}

// =============================================================================
// Naming conventions
// =============================================================================

/// Convert interface name to vtable field name (snake_case with vtable_ prefix)
/// IFoo -> vtable_i_foo
/// IShape -> vtable_i_shape
/// IGearScore -> vtable_i_gear_score
fn interface_to_field_name(interface: &Ident) -> Ident {
    let name = interface.to_string();
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::from("vtable_");

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            // Underscore before an uppercase letter that starts a new word
            // (handles the "IS" in "IShape")
            if i > 0 {
                let prev_lower = chars[i - 1].is_lowercase();
                let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                if prev_lower || next_lower {
                    result.push('_');
                }
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    format_ident!("{}", result)
}

/// Name of the static vtable for `interface` implemented by `struct_name`
fn vtable_static_name(struct_name: &Ident, interface: &Ident) -> Ident {
    format_ident!(
        "__{}_{}_VTABLE",
        struct_name.to_string().to_uppercase(),
        interface.to_string().to_uppercase()
    )
}

/// Name of the vtable accessor constant: vtable_i_foo -> VTABLE_I_FOO
fn vtable_const_name(field: &Ident) -> Ident {
    format_ident!("{}", field.to_string().to_uppercase())
}

/// Parameter names and types of a signature, skipping the receiver
fn signature_params(sig: &syn::Signature) -> (Vec<Ident>, Vec<Type>) {
    sig.inputs
        .iter()
        .filter_map(|arg| {
            if let FnArg::Typed(pat_type) = arg
                && let Pat::Ident(pat_ident) = pat_type.pat.as_ref()
            {
                return Some((pat_ident.ident.clone(), pat_type.ty.as_ref().clone()));
            }
            None
        })
        .unzip()
}

/// Whether a signature takes &mut self
fn takes_mut_self(sig: &syn::Signature) -> bool {
    sig.inputs
        .first()
        .is_some_and(|arg| matches!(arg, FnArg::Receiver(r) if r.mutability.is_some()))
}

// =============================================================================
// #[interface]
// =============================================================================

fn interface_internal(iid: LitStr, input: ItemTrait) -> Result<TokenStream2, syn::Error> {
    validate_trait(&input)?;

    if iid.value().is_empty() {
        return Err(syn::Error::new(
            iid.span(),
            "interface identifier must not be empty",
        ));
    }

    let trait_name = &input.ident;
    let vtable_name = format_ident!("{}VTable", trait_name);
    let vis = &input.vis;
    let attrs = &input.attrs;

    let mut vtable_fields = Vec::new();
    let mut wrapper_methods = Vec::new();

    for item in &input.items {
        let TraitItem::Fn(method) = item else {
            continue;
        };

        let method_name = &method.sig.ident;
        let (param_names, param_types) = signature_params(&method.sig);
        let output = &method.sig.output;
        let docs: Vec<_> = method
            .attrs
            .iter()
            .filter(|a| a.path().is_ident("doc"))
            .collect();

        vtable_fields.push(quote! {
            pub #method_name: unsafe extern "C" fn(
                this: *mut ::std::ffi::c_void
                #(, #param_names: #param_types)*
            ) #output
        });

        let (receiver, this_cast) = if takes_mut_self(&method.sig) {
            (
                quote! { &mut self },
                quote! { self as *mut Self as *mut ::std::ffi::c_void },
            )
        } else {
            (
                quote! { &self },
                quote! { self as *const Self as *mut ::std::ffi::c_void },
            )
        };

        wrapper_methods.push(quote! {
            #(#docs)*
            #[inline]
            pub fn #method_name(#receiver #(, #param_names: #param_types)*) #output {
                // SAFETY: a view can only be obtained from a live object
                unsafe { (self.vtable.#method_name)(#this_cast #(, #param_names)*) }
            }
        });
    }

    let vtable_doc = format!("VTable struct for {}", trait_name);
    let from_ptr_doc = format!(
        " - `ptr` must point to a live {} sub-object",
        trait_name
    );

    let expanded = quote! {
        #[doc = #vtable_doc]
        #[repr(C)]
        #vis struct #vtable_name {
            /// Inherited IObject vtable
            pub base: ::objects::IObjectVTable,
            #(#vtable_fields),*
        }

        #(#attrs)*
        #[repr(C)]
        #vis struct #trait_name {
            vtable: &'static #vtable_name,
        }

        unsafe impl ::objects::Interface for #trait_name {
            const IID: ::objects::Iid = ::objects::Iid::new(#iid);
            type VTable = #vtable_name;
        }

        impl #trait_name {
            /// Get the vtable
            #[inline]
            #[must_use]
            pub fn vtable(&self) -> &'static #vtable_name {
                self.vtable
            }

            /// Wrap a raw interface pointer for calling methods.
            ///
            /// # Safety
            ///
            #[doc = #from_ptr_doc]
            /// - The returned reference must not outlive the object
            #[inline]
            pub unsafe fn from_ptr<'a>(ptr: *mut ::std::ffi::c_void) -> &'a Self {
                unsafe { &*(ptr as *const Self) }
            }

            #(#wrapper_methods)*
        }
    };

    Ok(expanded)
}

/// Declare a capability interface.
///
/// This generates:
/// - A vtable struct `{Name}VTable` starting with `base: objects::IObjectVTable`
/// - A view struct `{Name}` holding the vtable pointer, with method wrappers
/// - An `objects::Interface` impl carrying the identifier
///
/// # Example
/// ```ignore
/// #[interface("demo.IShape")]
/// pub trait IShape {
///     fn area(&self) -> f64;
///     fn scale(&mut self, factor: f64);
/// }
/// ```
#[proc_macro_attribute]
pub fn interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    let iid = parse_macro_input!(attr as LitStr);
    let input = parse_macro_input!(item as ItemTrait);
    match interface_internal(iid, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

// =============================================================================
// #[object]
// =============================================================================

/// One argument of `#[object(...)]`
enum ObjectArg {
    Interface(Ident),
    RefCount(Type),
}

impl Parse for ObjectArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(Ident) && input.peek2(Token![=]) {
            let key: Ident = input.parse()?;
            if key != "refcount" {
                return Err(syn::Error::new(
                    key.span(),
                    format!("unknown option '{}', expected 'refcount = Type'", key),
                ));
            }
            input.parse::<Token![=]>()?;
            return Ok(ObjectArg::RefCount(input.parse()?));
        }
        Ok(ObjectArg::Interface(input.parse()?))
    }
}

/// Configuration for object generation
struct ObjectConfig {
    interfaces: Vec<Ident>,
    refcount: Option<Type>,
}

fn parse_object_config(attr: TokenStream2) -> Result<ObjectConfig, syn::Error> {
    let args = Punctuated::<ObjectArg, Token![,]>::parse_terminated.parse2(attr)?;

    let mut config = ObjectConfig {
        interfaces: Vec::new(),
        refcount: None,
    };

    for arg in args {
        match arg {
            ObjectArg::Interface(iface) => {
                if iface == "IObject" {
                    return Err(syn::Error::new(
                        iface.span(),
                        "IObject is implied and must not appear in the interface list",
                    ));
                }
                if config.interfaces.contains(&iface) {
                    return Err(syn::Error::new(
                        iface.span(),
                        format!("interface '{}' is listed twice", iface),
                    ));
                }
                config.interfaces.push(iface);
            }
            ObjectArg::RefCount(ty) => {
                if config.refcount.is_some() {
                    return Err(syn::Error::new(ty.span(), "refcount is given twice"));
                }
                config.refcount = Some(ty);
            }
        }
    }

    Ok(config)
}

fn object_internal(config: ObjectConfig, mut input: ItemStruct) -> Result<TokenStream2, syn::Error> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "generic object types are not supported",
        ));
    }

    let struct_name = input.ident.clone();

    // With no declared interface, a bare IObject vtable becomes the primary sub-object
    let bare = config.interfaces.is_empty();
    let object_ident = format_ident!("IObject");
    let primary = config.interfaces.first().unwrap_or(&object_ident).clone();
    let primary_field = interface_to_field_name(&primary);

    let vtable_fields: Vec<syn::Field> = if bare {
        vec![syn::Field::parse_named.parse2(quote! {
            /// VTable pointer for IObject
            pub #primary_field: ::objects::VTablePtr<#struct_name, ::objects::IObjectVTable>
        })?]
    } else {
        config
            .interfaces
            .iter()
            .map(|iface| {
                let field = interface_to_field_name(iface);
                let vtable = format_ident!("{}VTable", iface);
                let doc = format!("VTable pointer for {}", iface);
                syn::Field::parse_named.parse2(quote! {
                    #[doc = #doc]
                    pub #field: ::objects::VTablePtr<#struct_name, #vtable>
                })
            })
            .collect::<Result<_, _>>()?
    };

    // Prepend the vtable pointers to the user's fields
    match &mut input.fields {
        syn::Fields::Named(named) => {
            let user_fields = std::mem::take(&mut named.named);
            for field in user_fields.iter() {
                if let Some(ident) = &field.ident
                    && ident.to_string().starts_with("vtable_")
                {
                    return Err(syn::Error::new(
                        ident.span(),
                        "field names starting with 'vtable_' are reserved",
                    ));
                }
            }
            named.named.extend(vtable_fields);
            named.named.extend(user_fields);
        }
        syn::Fields::Unit => {
            let mut named: syn::FieldsNamed = syn::parse2(quote!({}))?;
            named.named.extend(vtable_fields);
            input.fields = syn::Fields::Named(named);
            input.semi_token = None;
        }
        syn::Fields::Unnamed(unnamed) => {
            return Err(syn::Error::new(
                unnamed.span(),
                "#[object] requires a struct with named fields",
            ));
        }
    }

    if !input.attrs.iter().any(|a| a.path().is_ident("repr")) {
        input.attrs.push(syn::parse_quote!(#[repr(C)]));
    }

    let refcount = config
        .refcount
        .as_ref()
        .map_or_else(|| quote! { ::objects::AtomicRefCount }, |ty| quote! { #ty });

    let mut entries = vec![quote! {
        .entry::<::objects::IObject>(|base: *const Self| {
            unsafe { ::core::ptr::addr_of!((*base).#primary_field) }.cast::<::objects::IObject>()
        })
    }];
    for iface in &config.interfaces {
        let field = interface_to_field_name(iface);
        entries.push(quote! {
            .entry::<#iface>(|base: *const Self| {
                unsafe { ::core::ptr::addr_of!((*base).#field) }.cast::<#iface>()
            })
        });
    }

    // A bare object owns its IObject vtable; otherwise #[implement] emits one per interface
    let bare_vtable = if bare {
        let static_name = vtable_static_name(&struct_name, &object_ident);
        let const_name = vtable_const_name(&primary_field);
        quote! {
            #[doc(hidden)]
            static #static_name: ::objects::IObjectVTable = ::objects::IObjectVTable::for_interface::<
                #struct_name,
                { ::core::mem::offset_of!(#struct_name, #primary_field) },
            >();

            impl #struct_name {
                /// Pointer to the IObject vtable. Use this when constructing the struct.
                pub const #const_name: ::objects::VTablePtr<#struct_name, ::objects::IObjectVTable> =
                    // SAFETY: the base entries are built for this field's offset
                    unsafe { ::objects::VTablePtr::new(&#static_name) };
            }
        }
    } else {
        quote! {}
    };

    let expanded = quote! {
        #input

        unsafe impl ::objects::ObjectBase for #struct_name {
            type RefCount = #refcount;

            fn registry() -> &'static ::objects::InterfaceRegistry {
                static REGISTRY: ::objects::InterfaceRegistry = ::objects::InterfaceRegistry::new();
                &REGISTRY
            }

            fn declare_interfaces(table: &mut ::objects::TableBuilder<Self>) {
                table #(#entries)*;
            }
        }

        #bare_vtable
    };

    Ok(expanded)
}

/// Declare a payload type and the interfaces it implements.
///
/// This generates:
/// - `#[repr(C)]` (unless a `repr` is already given)
/// - One vtable pointer field per interface, prepended to the struct's fields
///   (`vtable_i_shape: objects::VTablePtr<Circle, IShapeVTable>` for `IShape`)
/// - An `objects::ObjectBase` impl with a per-type interface registry
///
/// The first interface is the primary one: `IObject` resolves to it. With an
/// empty list the struct gets a single `vtable_i_object` field and a
/// `VTABLE_I_OBJECT` constant.
///
/// # Options
/// - `refcount = Type` - counter type (default: `objects::AtomicRefCount`)
///
/// # Example
/// ```ignore
/// #[object(IShape, INamed)]
/// pub struct Circle {
///     radius: f64,
/// }
///
/// #[object(IShape, refcount = objects::LocalRefCount)]
/// pub struct Square {
///     side: f64,
/// }
/// ```
#[proc_macro_attribute]
pub fn object(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = match parse_object_config(attr.into()) {
        Ok(config) => config,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemStruct);
    match object_internal(config, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

// =============================================================================
// #[implement]
// =============================================================================

fn implement_internal(interface_name: Ident, input: ItemImpl) -> Result<TokenStream2, syn::Error> {
    validate_impl(&input)?;

    let struct_type = &input.self_ty;
    let vtable_name = format_ident!("{}VTable", interface_name);

    let struct_name = match struct_type.as_ref() {
        Type::Path(type_path) => match type_path.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => return Err(syn::Error::new(struct_type.span(), "Expected a type path")),
        },
        _ => return Err(syn::Error::new(struct_type.span(), "Expected a type path")),
    };

    let vtable_field = interface_to_field_name(&interface_name);

    let mut wrapper_fns = Vec::new();
    let mut vtable_entries = Vec::new();

    for item in &input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };

        let method_name = &method.sig.ident;
        // Include interface name in wrapper to avoid conflicts between interfaces
        let wrapper_name = format_ident!("__{}__{}__{}", struct_name, interface_name, method_name);
        let (param_names, param_types) = signature_params(&method.sig);
        let output = &method.sig.output;

        let this_cast = if takes_mut_self(&method.sig) {
            quote! { &mut *adjusted }
        } else {
            quote! { &*adjusted }
        };

        // This-adjustment: step back from the interface pointer to the object base
        wrapper_fns.push(quote! {
            #[allow(non_snake_case)]
            unsafe extern "C" fn #wrapper_name(
                this: *mut ::std::ffi::c_void
                #(, #param_names: #param_types)*
            ) #output {
                unsafe {
                    let offset = ::core::mem::offset_of!(#struct_type, #vtable_field);
                    // The payload sits at offset 0 of its Object
                    let adjusted = ::objects::Object::<#struct_type>::from_interface(this, offset)
                        .cast::<#struct_type>()
                        .as_ptr();
                    let obj = #this_cast;
                    obj.#method_name(#(#param_names),*)
                }
            }
        });

        vtable_entries.push(quote! {
            #method_name: #wrapper_name
        });
    }

    let vtable_static = vtable_static_name(&struct_name, &interface_name);
    let vtable_const = vtable_const_name(&vtable_field);
    let items = &input.items;
    let attrs = &input.attrs;

    let expanded = quote! {
        #(#wrapper_fns)*

        #[doc(hidden)]
        static #vtable_static: #vtable_name = #vtable_name {
            base: ::objects::IObjectVTable::for_interface::<
                #struct_type,
                { ::core::mem::offset_of!(#struct_type, #vtable_field) },
            >(),
            #(#vtable_entries),*
        };

        #(#attrs)*
        impl #struct_type {
            /// Pointer to the vtable for this interface implementation.
            /// Use this when constructing the struct.
            pub const #vtable_const: ::objects::VTablePtr<#struct_type, #vtable_name> =
                // SAFETY: the base entries are built for this field's offset
                unsafe { ::objects::VTablePtr::new(&#vtable_static) };

            #(#items)*
        }
    };

    Ok(expanded)
}

/// Implement one interface for a payload type declared with `#[object]`.
///
/// This generates:
/// - Wrapper functions that adjust `this` and call your methods
/// - A static vtable whose `base` dispatches acquire/release/query to `objects::Object`
/// - A vtable accessor constant (`VTABLE_I_SHAPE` for `IShape`)
///
/// Method names and signatures must match the interface declaration. Order
/// does not matter.
///
/// # Example
/// ```ignore
/// #[implement(IShape)]
/// impl Circle {
///     fn area(&self) -> f64 { 3.14159 * self.radius * self.radius }
///     fn scale(&mut self, factor: f64) { self.radius *= factor; }
/// }
/// ```
#[proc_macro_attribute]
pub fn implement(attr: TokenStream, item: TokenStream) -> TokenStream {
    let interface_name = parse_macro_input!(attr as Ident);
    let input = parse_macro_input!(item as ItemImpl);
    match implement_internal(interface_name, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
