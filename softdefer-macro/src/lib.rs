use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{Expr, ExprLit, ImplItem, ItemFn, ItemImpl, Lit, Meta, MetaNameValue, Token};

type AttrArgs = Punctuated<Meta, Token![,]>;

/// Declares a long-lived [`DeferredCallback`] running this function
///
/// The function must take no arguments. A `static` named after the function
/// in upper case is generated next to it; `name = "OTHER"` picks a different
/// name for the static.
///
/// ```rust,ignore
/// #[deferred_callback]
/// fn report() {
///     tracing::info!("deferred callback ran");
/// }
///
/// REPORT.schedule();
/// REPORT.drain();
/// ```
#[proc_macro_attribute]
pub fn deferred_callback(args: TokenStream, input: TokenStream) -> TokenStream {
    declare_static(args, input, "DeferredCallback")
}

/// Declares a long-lived [`CooperativeTask`] running this function
///
/// ```rust,ignore
/// #[cooperative_task]
/// fn demo_tasklet() {
///     tracing::info!("tasklet ran");
/// }
///
/// DEMO_TASKLET.schedule();
/// DEMO_TASKLET.kill();
/// ```
#[proc_macro_attribute]
pub fn cooperative_task(args: TokenStream, input: TokenStream) -> TokenStream {
    declare_static(args, input, "CooperativeTask")
}

/// Declares a long-lived [`WorkItem`] running this function
#[proc_macro_attribute]
pub fn work_item(args: TokenStream, input: TokenStream) -> TokenStream {
    declare_static(args, input, "WorkItem")
}

/// Declares a long-lived [`DelayedWorkItem`] running this function
#[proc_macro_attribute]
pub fn delayed_work_item(args: TokenStream, input: TokenStream) -> TokenStream {
    declare_static(args, input, "DelayedWorkItem")
}

/// Registers a `DeferralModule` implementation for discovery
///
/// Fills in the trait's `NAME` constant and adds the module to the
/// link-time registry read by `ModuleHostBuilder::discover`.
///
/// ```rust,ignore
/// struct Ticker { task: CooperativeTask }
///
/// #[deferral_module(name = "ticker")]
/// impl DeferralModule for Ticker {
///     type Params = TickerParams;
///
///     fn init(params: TickerParams) -> Result<Self, ModuleError> { /* ... */ }
///     fn exit(self) { self.task.kill(); }
/// }
/// ```
#[proc_macro_attribute]
pub fn deferral_module(args: TokenStream, input: TokenStream) -> TokenStream {
    let attr_args = syn::parse_macro_input!(args with AttrArgs::parse_terminated);
    let mut input_impl = syn::parse_macro_input!(input as ItemImpl);

    let module_name = match string_arg(&attr_args, "name") {
        Ok(Some(name)) if !name.is_empty() => name,
        Ok(_) => {
            return syn::Error::new_spanned(
                &input_impl.self_ty,
                "deferral_module requires a non-empty `name = \"...\"` argument",
            )
            .to_compile_error()
            .into();
        }
        Err(e) => return e.to_compile_error().into(),
    };

    if input_impl.trait_.is_none() {
        return syn::Error::new_spanned(
            &input_impl.self_ty,
            "deferral_module must be applied to an `impl DeferralModule for T` block",
        )
        .to_compile_error()
        .into();
    }

    let declares_name = input_impl.items.iter().any(|item| {
        matches!(item, ImplItem::Const(constant) if constant.ident == "NAME")
    });
    if !declares_name {
        let name_const: ImplItem = syn::parse_quote! {
            const NAME: &'static str = #module_name;
        };
        input_impl.items.insert(0, name_const);
    }

    let impl_type = &input_impl.self_ty;
    let sanitized: String = module_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let register_fn_name = format_ident!("__register_deferral_module_{}", sanitized);

    let runtime = quote!(::softdefer::softdefer_runtime);
    let expanded = quote! {
        #input_impl

        // Auto-registration using linkme
        #[#runtime::linkme::distributed_slice(#runtime::MODULES)]
        #[linkme(crate = #runtime::linkme)]
        fn #register_fn_name() -> #runtime::ModuleEntry {
            #runtime::ModuleEntry::of::<#impl_type>()
        }
    };

    TokenStream::from(expanded)
}

fn declare_static(args: TokenStream, input: TokenStream, kind: &str) -> TokenStream {
    let attr_args = syn::parse_macro_input!(args with AttrArgs::parse_terminated);
    let input_fn = syn::parse_macro_input!(input as ItemFn);

    let sig = &input_fn.sig;
    if !sig.inputs.is_empty() || sig.asyncness.is_some() || !sig.generics.params.is_empty() {
        return syn::Error::new_spanned(
            sig,
            format!("#[{}] needs a plain `fn name()` with no arguments", attribute_name(kind)),
        )
        .to_compile_error()
        .into();
    }

    let fn_name = &sig.ident;
    let fn_vis = &input_fn.vis;
    let static_name = match string_arg(&attr_args, "name") {
        Ok(Some(name)) => format_ident!("{}", name),
        Ok(None) => format_ident!("{}", fn_name.to_string().to_uppercase()),
        Err(e) => return e.to_compile_error().into(),
    };
    let kind = format_ident!("{}", kind);

    let expanded = quote! {
        #input_fn

        #fn_vis static #static_name: ::std::sync::LazyLock<::softdefer::softdefer_runtime::#kind> =
            ::std::sync::LazyLock::new(|| {
                ::softdefer::softdefer_runtime::#kind::new(stringify!(#fn_name), #fn_name)
            });
    };

    TokenStream::from(expanded)
}

fn attribute_name(kind: &str) -> &'static str {
    match kind {
        "DeferredCallback" => "deferred_callback",
        "CooperativeTask" => "cooperative_task",
        "WorkItem" => "work_item",
        _ => "delayed_work_item",
    }
}

fn string_arg(attr_args: &AttrArgs, key: &str) -> syn::Result<Option<String>> {
    for arg in attr_args {
        match arg {
            Meta::NameValue(MetaNameValue { path, value, .. }) if path.is_ident(key) => {
                return match value {
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(s), ..
                    }) => Ok(Some(s.value())),
                    other => Err(syn::Error::new_spanned(
                        other,
                        format!("`{key}` must be a string literal"),
                    )),
                };
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    format!("unsupported argument; expected `{key} = \"...\"`"),
                ));
            }
        }
    }
    Ok(None)
}
