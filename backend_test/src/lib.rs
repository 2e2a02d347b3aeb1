use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject dependencies.
///
/// Each test gets a Rocket instance over its own fresh memory store.
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// the `MemoryStore` behind it, and, when the test is marked `admin` or
/// `voter`, a [`rocket::http::Header`] carrying that principal's bearer token.
/// Marking a test `admin` also provisions the admin's identity with the admin
/// role before the test runs.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let login = parse_macro_input!(args as Option<Ident>);

    // Extract parameters to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone(), login.is_some()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Sign in as admin/voter if needed.
    let login = match login {
        Some(arg) if arg == "admin" => quote! {
            let principal = crate::model::api::auth::Principal::example_admin();
            let admin = crate::model::db::identity::Identity {
                role: crate::model::common::role::Role::Admin,
                ..crate::model::db::identity::Identity::new(&principal)
            };
            crate::store::Store::provision_identity(&store, admin)
                .await
                .unwrap();
            let _auth = principal.bearer(&crate::config::Config::example());
        },
        Some(arg) if arg == "voter" => quote! {
            let _auth = crate::model::api::auth::Principal::example_voter()
                .bearer(&crate::config::Config::example());
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or `voter`")
                .into_compile_error()
                .into();
        }
        None => quote! {},
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            // Tests drive the whole backend, so enable its logging.
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["awards_backend"],
                None,
                None,
            );

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                // Test setup.
                let store = crate::store::MemoryStore::new();
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_store(store.clone()),
                )
                .await
                .unwrap();
                #login

                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature, signed_in: bool) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut injected = vec![];
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself
                    let type_ident = &type_path.path.segments.last().unwrap().ident;
                    let arg = if type_ident == "Client" {
                        quote! { rocket_client }
                    } else if type_ident == "MemoryStore" {
                        quote! { store.clone() }
                    } else if type_ident == "Header" {
                        if !signed_in {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test must be marked `admin` or `voter` to accept a `Header`",
                            ));
                        }
                        quote! { _auth.clone() }
                    } else {
                        return Err(unexpected(input));
                    };

                    let key = type_ident.to_string();
                    if injected.contains(&key) {
                        return Err(syn::Error::new(
                            input.span(),
                            format!("Test cannot accept more than one `{key}`"),
                        ));
                    }
                    injected.push(key);
                    args.push(arg);
                    continue;
                }
            }
        }

        return Err(unexpected(input));
    }

    Ok(args)
}

fn unexpected(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected one of `client_ident: Client`, `store_ident: MemoryStore` or `auth_ident: Header`",
    )
}
